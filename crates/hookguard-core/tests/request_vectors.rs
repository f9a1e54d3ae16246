//! Hook request decoding vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]


use hookguard_core::protocol::HookInput;
use hookguard_core::Result;

fn decode(body: &[u8]) -> Result<(HookInput, hookguard_core::Invocation)> {
    let input = HookInput::decode(body)?;
    let inv = input.to_invocation(&["bash".to_string()])?;
    Ok((input, inv))
}

#[test]
fn request_vectors() {
    let vectors = vector_loader::load("requests.json");
    assert!(!vectors.is_empty());

    for v in vectors {
        let res = decode(&v.body());
        match (&v.expect, &v.expect_error) {
            (Some(exp), None) => {
                let (input, inv) = res.unwrap_or_else(|e| panic!("{}: {e}", v.description));
                assert_eq!(inv.kind().as_str(), exp.kind, "{}", v.description);
                assert_eq!(inv.identifier(), exp.identifier, "{}", v.description);
                assert_eq!(input.is_pre_tool_use(), exp.pre_tool_use, "{}", v.description);
            }
            (None, Some(err)) => {
                let e = res.err().unwrap_or_else(|| panic!("{}: expected error", v.description));
                assert_eq!(e.code().as_str(), err.code, "{}", v.description);
            }
            _ => panic!("{}: vector needs exactly one of expect/expect_error", v.description),
        }
    }
}

#[test]
fn payload_round_trips_verbatim() {
    let body = br#"{"tool_name":"bash","tool_input":"{\"command\":\"echo \\\"hi\\\" | tee out.txt\",\"timeout\":30}"}"#;
    let (_, inv) = decode(body).unwrap();
    assert_eq!(inv.identifier(), r#"echo "hi" | tee out.txt"#);
    assert_eq!(inv.payload().get("timeout").map(String::as_str), Some("30"));
}
