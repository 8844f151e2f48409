use aerotab::codec::{Codec, CodecId, Confidence, FormatError, get_codec};
use aerotab::registry::{CodecRegistry, Resolution};
use aerotab::{tablefile, ArrayNd, Table, TableDatabase};
use proptest::prelude::*;
use std::fs;
use std::io::{BufRead, Cursor};
use tempfile::{Builder, NamedTempFile};

fn temp_with_suffix(suffix: &str) -> NamedTempFile {
    Builder::new().prefix("aerotab").suffix(suffix).tempfile().unwrap()
}

fn lift_table() -> Table {
    Table::two_d(
        "CL",
        ["MACH", "ALPHA"],
        vec![0.3, 0.6, 0.9],
        vec![-5.0, 5.0],
        vec![-0.25, 0.5, -0.2, 0.55, -0.125, 0.625],
    )
    .unwrap()
}

#[test]
fn nasa_two_argument_round_trip() {
    let registry = CodecRegistry::builtin();
    let tmp = temp_with_suffix(".nasa");
    let db = TableDatabase::from_tables([lift_table()]);

    tablefile::save_file(&registry, tmp.path(), &db, "nasa").unwrap();
    let back = tablefile::open_file(&registry, tmp.path()).unwrap();

    let t = back.get("CL").unwrap();
    let want = lift_table();
    assert_eq!(t.name(), want.name());
    assert_eq!(t.indep_names(), want.indep_names());
    assert_eq!(t.breakpoints(0), want.breakpoints(0));
    assert_eq!(t.breakpoints(1), want.breakpoints(1));
    assert_eq!(t.values().as_slice().len(), 6);
    for (a, b) in t.values().as_slice().iter().zip(want.values().as_slice()) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[test]
fn fdhs_signature_ignores_file_name() {
    let registry = CodecRegistry::builtin();
    let mut input = Cursor::new(b"*FDHS\nCL ALPHA 2\nall all\n0 1\n0.1 0.2\n".to_vec());
    let codec = registry.resolve(&mut input, "random.bin").unwrap().into_codec().unwrap();
    assert_eq!(codec.tag(), "fdhs");

    let fdhs = get_codec(CodecId::Fdhs);
    for name in ["deck.post", "", "CL.nasa"] {
        let mut c = Cursor::new(b"*FDHS\n".to_vec());
        assert_eq!(fdhs.can_read(name, &mut c).unwrap(), Confidence::Yes);
    }
}

#[test]
fn post_without_tab_namelist_is_refused() {
    let post = get_codec(CodecId::Post);
    let mut c = Cursor::new(b"c comments only\n table = 'CL', 1, 'A', 2, 8*1,\n 0, 1,\n 1, 2,\n $\n".to_vec());
    assert_eq!(post.can_read("deck.dat", &mut c).unwrap(), Confidence::No);
}

#[test]
fn otis_multiple_terms_is_structural() {
    let registry = CodecRegistry::builtin();
    let tmp = temp_with_suffix(".itd");
    fs::write(tmp.path(), "* deck\nCX\naxial force\n1.0\n2\n1\n1\nALPHA\n2\n0 1\n1 2\n").unwrap();

    match tablefile::open_file(&registry, tmp.path()) {
        Err(FormatError::Structure(msg)) => assert!(msg.contains("multiple term tables not supported")),
        other => panic!("unexpected {:?}", other.map(|db| db.names().join(","))),
    }
}

#[test]
fn sav_unknown_sub_type_is_unrecognized() {
    let registry = CodecRegistry::builtin();
    let mut input = Cursor::new(b"# rotor\nFOO 3 1 0\n 0.0 1.0 0.5\n".to_vec());
    assert!(matches!(
        tablefile::open_stream(&registry, &mut input, "rotor.sav"),
        Err(FormatError::Unrecognized(_)),
    ));
}

struct Sniffer {
    tag:  &'static str,
    desc: &'static str,
}

impl Codec for Sniffer {
    fn tag(&self) -> &'static str { self.tag }
    fn description(&self) -> &'static str { self.desc }
    fn extension(&self) -> &'static str { "tab" }
    fn can_write(&self) -> bool { false }

    fn can_read(&self, _name: &str, input: &mut dyn BufRead) -> std::io::Result<Confidence> {
        let mut line = String::new();
        input.read_line(&mut line)?;
        Ok(if line.starts_with("TAB") { Confidence::Maybe } else { Confidence::No })
    }

    fn decode(&self, _input: &mut dyn BufRead) -> Result<TableDatabase, FormatError> {
        Ok(TableDatabase::new())
    }
}

#[test]
fn two_maybes_are_ambiguous_in_registry_order() {
    let registry = CodecRegistry::with_codecs(vec![
        Box::new(Sniffer { tag: "zeta", desc: "Zeta tables" }),
        get_codec(CodecId::Nasa),
        Box::new(Sniffer { tag: "alpha", desc: "Alpha tables" }),
    ]);
    let mut input = Cursor::new(b"TAB 1\n".to_vec());

    match registry.resolve(&mut input, "x.tab").unwrap() {
        Resolution::Ambiguous(c) => {
            let tags: Vec<&str> = c.iter().map(|c| c.tag()).collect();
            assert_eq!(tags, vec!["alpha", "zeta"]);
        }
        Resolution::Found(c) => panic!("resolved to {}", c.tag()),
    }
    match tablefile::open_stream(&registry, &mut input, "x.tab") {
        Err(FormatError::Ambiguous { candidates }) => assert_eq!(candidates, vec!["alpha", "zeta"]),
        other => panic!("unexpected {:?}", other.map(|db| db.len())),
    }
}

#[test]
fn failed_save_leaves_existing_file_alone() {
    let registry = CodecRegistry::builtin();
    let tmp = temp_with_suffix(".nasa");
    fs::write(tmp.path(), "keep me\n").unwrap();

    let one_d = Table::one_d("THRUST", "ALT", vec![0.0, 1.0], vec![10.0, 9.0]).unwrap();
    let db = TableDatabase::from_tables([one_d]);
    assert!(matches!(
        tablefile::save_file(&registry, tmp.path(), &db, "nasa"),
        Err(FormatError::Structure(_)),
    ));
    assert_eq!(fs::read_to_string(tmp.path()).unwrap(), "keep me\n");

    assert!(matches!(
        tablefile::save_file(&registry, tmp.path(), &db, "otis"),
        Err(FormatError::Unsupported(_)),
    ));
    assert!(matches!(
        tablefile::save_file(&registry, tmp.path(), &db, "xlsx"),
        Err(FormatError::UnknownFormat(_)),
    ));
    assert_eq!(fs::read_to_string(tmp.path()).unwrap(), "keep me\n");
}

#[test]
fn convert_nasa_to_fdhs_and_post() {
    let registry = CodecRegistry::builtin();
    let src = temp_with_suffix(".nasa");
    tablefile::save_file(&registry, src.path(), &TableDatabase::from_tables([lift_table()]), "nasa").unwrap();
    let db = tablefile::open_file(&registry, src.path()).unwrap();

    for tag in ["fdhs", "post"] {
        let mut buf = Vec::new();
        tablefile::save_stream(&registry, &mut buf, &db, tag).unwrap();
        let back = tablefile::open_stream(&registry, &mut Cursor::new(buf), "converted.fda").unwrap();
        let (a, b) = (db.get("CL").unwrap(), back.get("CL").unwrap());
        assert_eq!(a.axes(), b.axes(), "{tag}");
        for (x, y) in a.values().as_slice().iter().zip(b.values().as_slice()) {
            assert!((x - y).abs() < 1e-5, "{tag}");
        }
    }
}

fn tags(r: Resolution<'_>) -> Vec<&'static str> {
    match r {
        Resolution::Found(c)     => vec![c.tag()],
        Resolution::Ambiguous(c) => c.iter().map(|c| c.tag()).collect(),
    }
}

#[test]
fn detection_is_idempotent_and_resolution_deterministic() {
    let registry = CodecRegistry::builtin();
    let samples: [(&str, &[u8]); 4] = [
        ("a.fda", b"*FDHS\n"),
        ("b.dat", b" $\np$tab\n"),
        ("c.sav", b"# x\nAOATL 3 1 0\n"),
        ("d.dat", b"CL\n"),
    ];
    for (name, bytes) in samples {
        for codec in registry.codecs() {
            let first = codec.can_read(name, &mut Cursor::new(bytes)).unwrap();
            let second = codec.can_read(name, &mut Cursor::new(bytes)).unwrap();
            assert_eq!(first, second, "{} on {name}", codec.tag());
        }
        let a = tags(registry.resolve(&mut Cursor::new(bytes), name).unwrap());
        let b = tags(registry.resolve(&mut Cursor::new(bytes), name).unwrap());
        assert_eq!(a, b);
    }
}

#[test]
fn json_view_round_trips() {
    let db = TableDatabase::from_tables([lift_table()]);
    let json = serde_json::to_string(&db).unwrap();
    let back: TableDatabase = serde_json::from_str(&json).unwrap();
    assert_eq!(back.get("CL"), db.get("CL"));
}

#[test]
fn mapping_tags_select_codecs_for_saving() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("table-codecs.json"), r#"{ "fda": "fdhs" }"#).unwrap();
    let registry = CodecRegistry::discover(&[dir.path()]);
    let db = TableDatabase::from_tables([lift_table()]);

    let mut buf = Vec::new();
    tablefile::save_stream(&registry, &mut buf, &db, "fda").unwrap();
    assert!(buf.starts_with(b"*FDHS\n"));

    let tmp = temp_with_suffix(".fda");
    tablefile::save_file(&registry, tmp.path(), &db, "FDA").unwrap();
    let back = tablefile::open_file_as(&registry, tmp.path(), "fda").unwrap();
    assert_eq!(back.get("CL").unwrap().axes(), lift_table().axes());

    let builtin = CodecRegistry::builtin();
    let mut buf = Vec::new();
    tablefile::save_stream(&builtin, &mut buf, &db, "flightlab").unwrap_err();
    assert!(buf.is_empty());
    assert!(matches!(
        tablefile::save_stream(&builtin, &mut buf, &db, "c-81"),
        Err(FormatError::Structure(_)),
    ));
}

#[test]
fn json_with_mismatched_shape_is_rejected() {
    let bad = r#"{"tables":[{"name":"T","axes":[],"values":{"shape":[1],"data":[0.0]}}]}"#;
    assert!(serde_json::from_str::<TableDatabase>(bad).is_err());
    let bad = r#"{"tables":[{"name":"T","axes":[{"name":"X","breakpoints":[0.0]}],
                  "values":{"shape":[2],"data":[0.0,1.0]}}]}"#;
    assert!(serde_json::from_str::<TableDatabase>(bad).is_err());
}

proptest! {
    #[test]
    fn value_count_is_product_of_breakpoint_counts(shape in prop::collection::vec(1usize..6, 1..5)) {
        let names: Vec<String> = (0..shape.len()).map(|d| format!("X{d}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let bps = shape.iter().map(|&n| (0..n).map(|k| k as f64).collect()).collect();
        let t = Table::new("T", &refs, bps).unwrap();
        prop_assert_eq!(t.values().len(), shape.iter().product::<usize>());
        prop_assert_eq!(t.shape(), shape.as_slice());
    }

    #[test]
    fn post_round_trip_is_exact(values in prop::collection::vec(-1.0e6f64..1.0e6, 2..20)) {
        let bp: Vec<f64> = (0..values.len()).map(|k| k as f64 * 0.5).collect();
        let arr = ArrayNd::from_vec(&[values.len()], values).unwrap();
        let t = Table::with_values("P", &["X"], vec![bp], arr).unwrap();
        let db = TableDatabase::from_tables([t.clone()]);

        let post = get_codec(CodecId::Post);
        let mut buf = Vec::new();
        post.encode(&mut buf, &db).unwrap();
        let back = post.decode(&mut Cursor::new(buf)).unwrap();
        prop_assert_eq!(back.get("P"), Some(&t));
    }
}
