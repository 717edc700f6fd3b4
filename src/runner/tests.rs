use super::*;
use crate::toolkit::fake::FakeToolkit;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;

const SCRIPT: &str = r#"send({name: "get_obj_from_frida_script", payload: {answer: 42}});"#;

fn request(pid: Option<u32>, source: &str) -> Request {
    Request {
        pid,
        script: Some(Script::Base64(STANDARD.encode(source))),
        timeout: None,
    }
}

#[test]
fn missing_pid() {
    for pid in [None, Some(0)] {
        let mut toolkit = FakeToolkit::default();
        let outcome = run_to_outcome(&mut toolkit, &request(pid, SCRIPT));
        assert_eq!(outcome.to_line(), r#"{"error":"Error: Must provide pid."}"#);

        // We never got as far as the device
        assert!(toolkit.injected.is_empty());
    }

    // Even without a script
    let mut toolkit = FakeToolkit::default();
    let outcome = run_to_outcome(&mut toolkit, &Request::default());
    assert_eq!(outcome.to_line(), r#"{"error":"Error: Must provide pid."}"#);
}

#[test]
fn result() {
    let mut toolkit = FakeToolkit::replying(vec![json!({
        "type": "send",
        "payload": {"name": "get_obj_from_frida_script", "payload": {"answer": 42}},
    })]);

    let outcome = run_to_outcome(&mut toolkit, &request(Some(1234), SCRIPT));
    assert_eq!(outcome, Outcome::Result(r#"{"answer":42}"#.into()));
    assert_eq!(outcome.to_line(), r#"{"result":"{\"answer\":42}"}"#);

    // The decoded source went to the right process
    assert_eq!(toolkit.injected, vec![(Target::Pid(1234), SCRIPT.to_owned())]);
}

#[test]
fn result_inside_toolkit_wrapper() {
    // What Frida hands over for a plain `send()`
    let raw = json!({
        "type": "send",
        "payload": {"name": "get_obj_from_frida_script", "payload": {"answer": 42}},
    });
    let mut toolkit = FakeToolkit::replying(vec![json!({
        "error": "missing field `type`",
        "data": raw.to_string(),
    })]);

    let outcome = run_to_outcome(&mut toolkit, &request(Some(1234), SCRIPT));
    assert_eq!(outcome.to_line(), r#"{"result":"{\"answer\":42}"}"#);
}

#[test]
fn pid_parsing() {
    assert_eq!(parse_pid("1234"), Some(1234));
    assert_eq!(parse_pid("  1234\n"), Some(1234));
    assert_eq!(parse_pid("+7"), Some(7));
    assert_eq!(parse_pid("12abc"), Some(12));
    assert_eq!(parse_pid("42.5"), Some(42));

    assert_eq!(parse_pid(""), None);
    assert_eq!(parse_pid("0"), None);
    assert_eq!(parse_pid("abc"), None);
    assert_eq!(parse_pid("-5"), None);
    assert_eq!(parse_pid("99999999999"), None);
}

#[test]
fn result_without_payload() {
    let mut toolkit = FakeToolkit::replying(vec![json!({
        "type": "send",
        "payload": {"name": "get_obj_from_frida_script"},
    })]);

    let outcome = run_to_outcome(&mut toolkit, &request(Some(1), SCRIPT));
    assert_eq!(outcome, Outcome::Result("null".into()));
}

#[test]
fn first_message_decides() {
    let other = json!({"type": "send", "payload": {"name": "progress", "payload": 1}});
    let mut toolkit = FakeToolkit::replying(vec![
        other.clone(),
        json!({
            "type": "send",
            "payload": {"name": "get_obj_from_frida_script", "payload": 2},
        }),
    ]);

    let outcome = run_to_outcome(&mut toolkit, &request(Some(1), SCRIPT));
    assert_eq!(outcome, Outcome::Error(other.to_string()));
    assert!(!outcome.to_line().contains('\n'));
}

#[test]
fn script_error() {
    let message = json!({
        "type": "error",
        "description": "ReferenceError: 'ObjC' is not defined",
        "lineNumber": 1,
    });
    let mut toolkit = FakeToolkit::replying(vec![message.clone()]);

    let outcome = run_to_outcome(&mut toolkit, &request(Some(1), SCRIPT));
    assert_eq!(outcome, Outcome::Error(message.to_string()));
}

#[test]
fn toolkit_failure() {
    let mut toolkit = FakeToolkit {
        fail_with: Some(|| {
            ToolkitError::Attaching(Target::Pid(99), "unable to find process with pid 99".into())
        }),
        ..Default::default()
    };

    let outcome = run_to_outcome(&mut toolkit, &request(Some(99), SCRIPT));
    assert_eq!(
        outcome,
        Outcome::Error(
            "Error: error attaching to pid 99: unable to find process with pid 99".into()
        )
    );
}

#[test]
fn no_message() {
    // The toolkit finished and dropped its sender without delivering anything
    let mut toolkit = FakeToolkit::default();
    let outcome = run_to_outcome(&mut toolkit, &request(Some(1), SCRIPT));
    assert_eq!(
        outcome,
        Outcome::Error("Error: script finished without sending a message".into())
    );
}

#[test]
fn timeout() {
    let mut toolkit = FakeToolkit {
        hold_sender: true,
        ..Default::default()
    };
    let request = Request {
        timeout: Some(Duration::from_millis(10)),
        ..request(Some(1), SCRIPT)
    };

    let err = run(&mut toolkit, &request).unwrap_err();
    assert!(matches!(err, RunError::TimedOut(_)));
    assert!(toolkit.held_sender.is_some());
}

#[test]
fn bad_base64() {
    let mut toolkit = FakeToolkit::default();
    let request = Request {
        pid: Some(1),
        script: Some(Script::Base64("not base64!".into())),
        timeout: None,
    };

    let outcome = run_to_outcome(&mut toolkit, &request);
    assert!(matches!(&outcome, Outcome::Error(e) if e.starts_with("Error: script is not valid base64")));
    assert!(toolkit.injected.is_empty());
}

#[test]
fn plain_source() {
    let mut toolkit = FakeToolkit::replying(vec![json!({
        "type": "send",
        "payload": {"name": "get_obj_from_frida_script", "payload": "ok"},
    })]);
    let request = Request {
        pid: Some(7),
        script: Some(Script::Source("send(1)".into())),
        timeout: None,
    };

    assert_eq!(run(&mut toolkit, &request).unwrap(), json!("ok"));
    assert_eq!(toolkit.injected[0].1, "send(1)");
}

#[test]
fn classify_requires_send() {
    let message = ScriptMessage(json!({
        "type": "log",
        "payload": {"name": "get_obj_from_frida_script", "payload": 1},
    }));
    assert!(matches!(classify(message), Err(RunError::Rejected(_))));

    let message = ScriptMessage(json!({"type": "send", "payload": "get_obj_from_frida_script"}));
    assert!(matches!(classify(message), Err(RunError::Rejected(_))));
}
