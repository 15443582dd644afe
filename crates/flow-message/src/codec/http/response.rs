use super::{text, Head, HttpKind, HttpRes, HTTP_VERSION};
use crate::error::Result;

pub const HTTP_STATUS: &str = "HTTP_STATUS";
pub const HTTP_STATUS_TEXT: &str = "HTTP_STATUS_TEXT";

#[derive(Debug)]
pub struct Response;

impl HttpKind for Response {
    const NAME: &'static str = "http-response";

    const START: [&'static str; 3] = [HTTP_VERSION, HTTP_STATUS, HTTP_STATUS_TEXT];

    fn start_line(head: &Head) -> String {
        let mut line = format!("{} {}", text(head, HTTP_VERSION), text(head, HTTP_STATUS));
        let reason = text(head, HTTP_STATUS_TEXT);
        if !reason.is_empty() {
            line.push(' ');
            line.push_str(&reason);
        }
        line
    }
}

impl HttpRes {
    pub fn status(&self) -> Result<String> {
        Ok(text(&self.head()?, HTTP_STATUS))
    }

    pub fn status_text(&self) -> Result<String> {
        Ok(text(&self.head()?, HTTP_STATUS_TEXT))
    }
}

#[cfg(test)]
mod tests {
    use super::super::{header, HTTP_BODY};
    use super::*;
    use crate::codec::{Json, Xml};
    use crate::message::{Message, Unpredictable};
    use crate::value::Value;
    use std::collections::BTreeSet;

    struct Clock;

    impl Unpredictable for Clock {
        fn name(&self) -> String {
            "clock".to_owned()
        }
    }

    fn json_body(bytes: &[u8]) -> Result<Option<Box<dyn Message>>> {
        Ok(Some(Box::new(Json::from_bytes(bytes)?)))
    }

    #[test]
    fn test_empty() {
        assert_eq!(HttpRes::new().assertable(&[]).unwrap(), " \r\n\r\n");
    }

    #[test]
    fn test_populated() {
        let mut msg = HttpRes::new()
            .with(HTTP_VERSION, "version")
            .unwrap()
            .with(HTTP_STATUS, "status")
            .unwrap()
            .with(HTTP_STATUS_TEXT, "text")
            .unwrap()
            .with(&header("key"), "value")
            .unwrap()
            .with_body(Json::new());
        msg.set("body", "content").unwrap();

        assert_eq!(msg.status().unwrap(), "status");
        assert_eq!(msg.status_text().unwrap(), "text");
        assert_eq!(msg.get("body").unwrap(), Some(Value::from("content")));

        let expected = "version status text\r\nkey: value\r\n\r\n{\n  \"body\" : \"content\"\n}";
        assert_eq!(msg.assertable(&[]).unwrap(), expected);
        assert_eq!(msg.peer(expected.as_bytes()).unwrap().assertable(&[]).unwrap(), expected);
        assert_eq!(
            msg.fields().unwrap(),
            ["HTTP_BODY", "HTTP_STATUS", "HTTP_STATUS_TEXT", "HTTP_VERSION", "^key^", "body"]
                .into_iter()
                .map(String::from)
                .collect::<BTreeSet<_>>()
        );
        assert_eq!(
            String::from_utf8(msg.content().unwrap()).unwrap(),
            "version status text\r\nkey: value\r\n\r\n{\"body\":\"content\"}"
        );
    }

    #[test]
    fn test_parse() {
        let msg = HttpRes::from_bytes(
            b"HTTP/1.1 418 I'm a teapot\r\nbad header\r\nkey: value\r\n\r\n{\n  \"body\" : \"content\"\n}",
            json_body,
        )
        .unwrap();
        assert_eq!(msg.status_text().unwrap(), "I'm a teapot");
        assert_eq!(
            msg.assertable(&[]).unwrap(),
            "HTTP/1.1 418 I'm a teapot\r\nkey: value\r\n\r\n{\n  \"body\" : \"content\"\n}"
        );
    }

    #[test]
    fn test_missing_status_text() {
        let bytes = b"HTTP/1.1 418\r\nkey: value\r\n\r\n{\n  \"body\" : \"content\"\n}";
        let msg = HttpRes::from_bytes(bytes, json_body).unwrap();
        assert_eq!(msg.get(HTTP_STATUS_TEXT).unwrap(), None);
        assert_eq!(
            msg.assertable(&[]).unwrap(),
            "HTTP/1.1 418\r\nkey: value\r\n\r\n{\n  \"body\" : \"content\"\n}"
        );
    }

    #[test]
    fn test_peer_without_body_template_holds_text() {
        let msg = HttpRes::new();
        let peer = msg
            .peer(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nhello")
            .unwrap();
        assert_eq!(peer.body().map(|b| b.codec()), Some("text"));
        assert_eq!(peer.body_text().unwrap(), "hello");
        assert_eq!(
            peer.headers().unwrap().get("Content-Type").map(String::as_str),
            Some("text/plain")
        );
    }

    #[test]
    fn test_body_text_masks() {
        let mut body = Xml::new();
        body.set("a/b", "1234-5678").unwrap();
        body.masking(&Clock, |m| m.text_replace(r"\d{4}-\d{4}", "####-####"))
            .unwrap();
        let mut msg = HttpRes::new()
            .with(HTTP_VERSION, "HTTP/1.1")
            .unwrap()
            .with(HTTP_STATUS, 200)
            .unwrap()
            .with(&header("Date"), "Tue, 01 Jan 2030 00:00:00 GMT")
            .unwrap()
            .with_body(body);
        msg.masking(&Clock, |m| m.replace(&header("Date"), "<date>"))
            .unwrap();

        let masked = msg.assertable(&[&Clock]).unwrap();
        assert_eq!(
            masked,
            "HTTP/1.1 200\r\nDate: <date>\r\n\r\n<a>\n  <b>####-####</b>\n</a>"
        );
        assert!(String::from_utf8(msg.content().unwrap())
            .unwrap()
            .contains("1234-5678"));
        assert_eq!(msg.get(HTTP_BODY).unwrap(), Some(Value::Bytes(b"<a><b>1234-5678</b></a>".to_vec())));
    }
}
