// Round trip of randomly generated command trees through the XML codec

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scan_editor::scan::{Comparison, Value, total_count};
use scan_editor::xml::{decode, decode_str, encode, encode_string};
use scan_editor::{CodecError, ScanCommand};

const COMPARISONS: [Comparison; 7] = [
    Comparison::Equals,
    Comparison::Above,
    Comparison::AtLeast,
    Comparison::Below,
    Comparison::AtMost,
    Comparison::IncreaseBy,
    Comparison::DecreaseBy,
];

const WORDS: [&str; 8] = ["motor_x", "detector", "temp", "a < b", "R&D", "shutter", "x", "line 2"];

fn word(rng: &mut StdRng) -> String {
    WORDS[rng.gen_range(0..WORDS.len())].to_string()
}

fn text(rng: &mut StdRng) -> String {
    let count = rng.gen_range(0..4);
    (0..count).map(|_| word(rng)).collect::<Vec<_>>().join(" ")
}

fn number(rng: &mut StdRng) -> f64 {
    match rng.gen_range(0..3) {
        0 => rng.gen_range(-10i32..10) as f64,
        1 => rng.gen_range(-1.0e6..1.0e6),
        _ => rng.gen_range(0.0..1.0e-3),
    }
}

fn body(rng: &mut StdRng, depth: u32) -> Vec<ScanCommand> {
    let len = rng.gen_range(0..4);
    (0..len).map(|_| command(rng, depth + 1)).collect()
}

fn command(rng: &mut StdRng, depth: u32) -> ScanCommand {
    // Blocks only while the tree is shallow
    let kinds = if depth < 3 { 10 } else { 7 };
    match rng.gen_range(0..kinds) {
        0 => ScanCommand::comment(text(rng)),
        1 => ScanCommand::move_to(word(rng), number(rng)),
        2 => {
            let value = if rng.gen_bool(0.5) {
                Value::Number(number(rng))
            } else {
                Value::Text(text(rng))
            };
            let mut set = ScanCommand::set(word(rng), value);
            if let ScanCommand::Set { wait, .. } = &mut set {
                *wait = rng.gen_bool(0.5);
            }
            set
        }
        3 => ScanCommand::wait(number(rng).abs()),
        4 => ScanCommand::WaitFor {
            device: word(rng),
            comparison: COMPARISONS[rng.gen_range(0..COMPARISONS.len())],
            desired: number(rng),
            tolerance: number(rng).abs(),
            timeout: rng.gen_bool(0.5).then(|| number(rng).abs()),
        },
        5 => {
            let count = rng.gen_range(0..3);
            let devices: Vec<String> = (0..count).map(|_| word(rng)).collect();
            ScanCommand::log_devices(text(rng), devices)
        }
        6 => ScanCommand::Include {
            path: format!("{}.scn", word(rng)),
            macros: if rng.gen_bool(0.5) {
                String::new()
            } else {
                format!("M={}", word(rng))
            },
        },
        7 => ScanCommand::loop_over(
            word(rng),
            number(rng),
            number(rng),
            number(rng),
            body(rng, depth),
        ),
        8 => ScanCommand::sequence(body(rng, depth)),
        _ => ScanCommand::parallel(body(rng, depth)),
    }
}

#[test]
fn test_generated_trees_round_trip() {
    let mut rng = StdRng::seed_from_u64(0x5ca9);
    for _ in 0..200 {
        let len = rng.gen_range(0..8);
        let commands: Vec<ScanCommand> = (0..len).map(|_| command(&mut rng, 0)).collect();

        let xml = encode_string(&commands).unwrap();
        let decoded = decode_str(&xml).unwrap_or_else(|e| panic!("{}\n{}", e, xml));
        assert_eq!(decoded, commands, "{}", xml);
        assert_eq!(total_count(&decoded), total_count(&commands));
    }
}

#[test]
fn test_round_trip_through_reader_and_writer() {
    let mut rng = StdRng::seed_from_u64(7);
    let commands: Vec<ScanCommand> = (0..20).map(|_| command(&mut rng, 0)).collect();

    let mut buf = Vec::new();
    encode(&commands, &mut buf).unwrap();
    assert_eq!(decode(buf.as_slice()).unwrap(), commands);
}

#[test]
fn test_deeply_nested_blocks() {
    let mut tree = vec![ScanCommand::wait(1.0)];
    for level in 0..32 {
        tree = vec![match level % 3 {
            0 => ScanCommand::sequence(tree),
            1 => ScanCommand::parallel(tree),
            _ => ScanCommand::loop_over("x", 0.0, 1.0, 0.5, tree),
        }];
    }
    let xml = encode_string(&tree).unwrap();
    assert_eq!(decode_str(&xml).unwrap(), tree);
    assert_eq!(total_count(&tree), 33);
}

#[test]
fn test_unknown_command_anywhere_rejects_document() {
    let xml = r#"<commands>
        <sequence><body>
            <wait><seconds>1</seconds></wait>
            <loop><device>x</device><start>0</start><end>1</end><step>1</step>
                <body><teleport/></body>
            </loop>
        </body></sequence>
    </commands>"#;
    assert!(matches!(
        decode_str(xml),
        Err(CodecError::UnknownCommand(ref tag)) if tag == "teleport"
    ));
}

#[test]
fn test_truncated_document_is_malformed() {
    let xml = encode_string(&[ScanCommand::move_to("x", 5.0), ScanCommand::wait(2.0)]).unwrap();
    let truncated = &xml[..xml.len() / 2];
    let err = decode_str(truncated).unwrap_err();
    assert!(err.is_malformed(), "{:?}", err);
}
