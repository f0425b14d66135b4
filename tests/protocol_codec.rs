use pdf2img::protocol::{
    PayloadFile, SupervisorMessage, WorkerMessage, decode_supervisor_line, decode_worker_line,
    encode_line,
};

#[test]
fn page_message_uses_wire_names() {
    let msg = WorkerMessage::PageImage {
        file: "a.pdf".into(),
        file_index: Some(1),
        page_index: 3,
        bytes: vec![0, 159, 146, 150, 255],
    };
    let line = encode_line(&msg).unwrap();
    assert_eq!(*line.last().unwrap(), b'\n');
    let text = std::str::from_utf8(&line).unwrap();
    assert_eq!(text.lines().count(), 1);

    let v: serde_json::Value = serde_json::from_str(text).unwrap();
    assert_eq!(v["kind"], "page");
    assert_eq!(v["file"], "a.pdf");
    assert_eq!(v["fileIndex"], 1);
    assert_eq!(v["pageIndex"], 3);
    assert_eq!(v["bytes"], "AJ+Slv8=");

    assert_eq!(decode_worker_line(text).unwrap(), msg);
}

#[test]
fn done_and_error_decode_from_plain_json() {
    assert_eq!(
        decode_worker_line(r#"{"kind":"done"}"#).unwrap(),
        WorkerMessage::Done { pages: None }
    );
    assert_eq!(
        decode_worker_line(r#"{"kind":"done","pages":4}"#).unwrap(),
        WorkerMessage::Done { pages: Some(4) }
    );
    let err = decode_worker_line(r#"{"kind":"error","reason":"Failed to convert PDFs."}"#).unwrap();
    assert!(err.is_terminal());
    assert_eq!(
        err,
        WorkerMessage::Error {
            reason: "Failed to convert PDFs.".into()
        }
    );
}

#[test]
fn page_without_file_index_still_decodes() {
    let msg = decode_worker_line(r#"{"kind":"page","file":"a.pdf","pageIndex":2,"bytes":"AA=="}"#)
        .unwrap();
    assert_eq!(
        msg,
        WorkerMessage::PageImage {
            file: "a.pdf".into(),
            file_index: None,
            page_index: 2,
            bytes: vec![0],
        }
    );
}

#[test]
fn rejects_unknown_kind_and_bad_base64() {
    assert!(decode_worker_line(r#"{"kind":"progress"}"#).is_err());
    assert!(decode_worker_line(r#"{"kind":"page","file":"a","pageIndex":1,"bytes":"!!"}"#).is_err());
    assert!(decode_worker_line("not json").is_err());
}

#[test]
fn supervisor_messages() {
    let job = SupervisorMessage::Job {
        files: vec![PayloadFile {
            name: "x.pdf".into(),
            bytes: b"%PDF-1.4".to_vec(),
            media_type: Some("application/pdf".into()),
        }],
    };
    let line = encode_line(&job).unwrap();
    let text = String::from_utf8(line).unwrap();
    assert!(text.contains(r#""kind":"job""#));
    assert!(text.contains(r#""mediaType":"application/pdf""#));
    assert_eq!(decode_supervisor_line(&text).unwrap(), job);

    assert_eq!(
        decode_supervisor_line(r#"{"kind":"complete"}"#).unwrap(),
        SupervisorMessage::Complete
    );
}
