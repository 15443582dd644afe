use super::{text, HttpKind, HttpMessage, HttpReq, Head, HTTP_VERSION};
use crate::error::{MessageError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

pub const HTTP_METHOD: &str = "HTTP_METHOD";

/// The request path. Segments written as `%name%` are filled from the
/// matching path variable fields.
pub const HTTP_PATH: &str = "HTTP_PATH";

const PATH_VAR_AFFIX: char = '%';

static PATH_VAR: Lazy<Regex> = Lazy::new(|| Regex::new("%.*?%").expect("valid regex"));

/// The field name for path variable `name`.
pub fn path_var(name: &str) -> String {
    format!("{PATH_VAR_AFFIX}{name}{PATH_VAR_AFFIX}")
}

fn is_path_var(field: &str) -> bool {
    field.len() >= 2 && field.starts_with(PATH_VAR_AFFIX) && field.ends_with(PATH_VAR_AFFIX)
}

/// Request path with path variables substituted.
fn resolved_path(head: &Head) -> String {
    head.iter()
        .filter(|(field, _)| is_path_var(field))
        .fold(text(head, HTTP_PATH), |path, (field, value)| {
            path.replace(field.as_str(), &value.to_string())
        })
}

#[derive(Debug)]
pub struct Request;

impl HttpKind for Request {
    const NAME: &'static str = "http-request";

    const START: [&'static str; 3] = [HTTP_METHOD, HTTP_PATH, HTTP_VERSION];

    fn owns(field: &str) -> bool {
        field == super::HTTP_BODY
            || Self::START.iter().any(|f| *f == field)
            || super::is_header_field(field)
            || is_path_var(field)
    }

    fn start_line(head: &Head) -> String {
        format!(
            "{} {} {}",
            text(head, HTTP_METHOD),
            resolved_path(head),
            text(head, HTTP_VERSION)
        )
    }

    fn extra_fields(head: &Head) -> Vec<String> {
        head.keys().filter(|f| is_path_var(f)).cloned().collect()
    }

    /// Recovers path variables by matching the peer's path against the
    /// template's path pattern. A path that doesn't fit the pattern is kept verbatim.
    fn adopt(peer: &mut HttpMessage<Self>, template: &Head) -> Result<()> {
        let pattern = text(template, HTTP_PATH);
        let names: Vec<&str> = PATH_VAR.find_iter(&pattern).map(|m| m.as_str()).collect();
        let literals: Vec<String> = PATH_VAR.split(&pattern).map(regex::escape).collect();
        let matcher = Regex::new(&format!("^{}$", literals.join("(.*?)")))
            .map_err(|e| MessageError::invalid_field(Self::NAME, HTTP_PATH, e.to_string()))?;

        let path = text(&peer.head()?, HTTP_PATH);
        if let Some(caps) = matcher.captures(&path) {
            for (name, value) in names.iter().zip(caps.iter().skip(1)) {
                peer.set(name, value.map_or("", |m| m.as_str()))?;
            }
            peer.set(HTTP_PATH, pattern.as_str())?;
        }
        Ok(())
    }
}

impl HttpReq {
    pub fn method(&self) -> Result<String> {
        Ok(text(&self.head()?, HTTP_METHOD))
    }

    /// The request path as it goes on the wire.
    pub fn path(&self) -> Result<String> {
        Ok(resolved_path(&self.head()?))
    }

    /// Path variable values by field name.
    pub fn path_vars(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .head()?
            .into_iter()
            .filter(|(field, _)| is_path_var(field))
            .map(|(field, value)| (field, value.to_string()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{header, HTTP_BODY};
    use super::*;
    use crate::codec::{Json, WebSequence};
    use crate::message::{Message, Unpredictable};
    use crate::value::{Value, DELETE};
    use std::collections::BTreeSet;

    struct Rng;

    impl Unpredictable for Rng {
        fn name(&self) -> String {
            "rng".to_owned()
        }
    }

    fn json_body(bytes: &[u8]) -> Result<Option<Box<dyn Message>>> {
        Ok(Some(Box::new(Json::from_bytes(bytes)?)))
    }

    fn populated() -> HttpReq {
        let mut msg = HttpReq::new()
            .with(HTTP_METHOD, "method")
            .unwrap()
            .with(HTTP_PATH, "path")
            .unwrap()
            .with(HTTP_VERSION, "version")
            .unwrap()
            .with(&header("key"), "value")
            .unwrap()
            .with_body(Json::new());
        msg.set("body", "content").unwrap();
        msg
    }

    #[test]
    fn test_empty() {
        let msg = HttpReq::new();
        assert_eq!(msg.assertable(&[]).unwrap(), "  \r\n\r\n");
        assert_eq!(msg.body_text().unwrap(), "");

        let mut msg = HttpReq::new().with_body(Json::new().with("foo", "bar").unwrap());
        assert_eq!(
            msg.assertable(&[]).unwrap(),
            "  \r\n\r\n{\n  \"foo\" : \"bar\"\n}"
        );
        msg.set(HTTP_BODY, DELETE).unwrap();
        assert_eq!(msg.assertable(&[]).unwrap(), "  \r\n\r\n");
    }

    #[test]
    fn test_populated() {
        let msg = populated();
        assert_eq!(msg.get(HTTP_METHOD).unwrap(), Some(Value::from("method")));
        assert_eq!(msg.get(HTTP_PATH).unwrap(), Some(Value::from("path")));
        assert_eq!(msg.get(HTTP_VERSION).unwrap(), Some(Value::from("version")));
        assert_eq!(msg.get(&header("key")).unwrap(), Some(Value::from("value")));
        assert_eq!(msg.get("body").unwrap(), Some(Value::from("content")));
        assert_eq!(
            msg.get(HTTP_BODY).unwrap(),
            Some(Value::Bytes(br#"{"body":"content"}"#.to_vec()))
        );

        let expected = "method path version\r\nkey: value\r\n\r\n{\n  \"body\" : \"content\"\n}";
        assert_eq!(msg.assertable(&[]).unwrap(), expected);
        assert_eq!(msg.peer(expected.as_bytes()).unwrap().assertable(&[]).unwrap(), expected);

        assert_eq!(
            msg.fields().unwrap(),
            ["HTTP_BODY", "HTTP_METHOD", "HTTP_PATH", "HTTP_VERSION", "^key^", "body"]
                .into_iter()
                .map(String::from)
                .collect::<BTreeSet<_>>()
        );
        assert_eq!(
            String::from_utf8(msg.content().unwrap()).unwrap(),
            "method path version\r\nkey: value\r\n\r\n{\"body\":\"content\"}"
        );
        assert_eq!(msg.body_text().unwrap(), "{\n  \"body\" : \"content\"\n}");
    }

    #[test]
    fn test_path_variables() {
        let msg = HttpReq::new()
            .with(HTTP_METHOD, "GET")
            .unwrap()
            .with(HTTP_PATH, "/root/foo/%foo_id%/bar/%bar_id%/baz/^baz_id^")
            .unwrap()
            .with(HTTP_VERSION, "HTTP/1.1")
            .unwrap()
            .with(&header("foo_id"), "not a path var")
            .unwrap()
            .with(&header("bar_id"), "also not a path var")
            .unwrap()
            .with(&path_var("foo_id"), 1)
            .unwrap()
            .with(&path_var("bar_id"), 2)
            .unwrap();

        assert_eq!(msg.get(&path_var("foo_id")).unwrap(), Some(Value::from(1)));
        assert_eq!(msg.path().unwrap(), "/root/foo/1/bar/2/baz/^baz_id^");
        assert_eq!(
            msg.assertable(&[]).unwrap(),
            "GET /root/foo/1/bar/2/baz/^baz_id^ HTTP/1.1\r\n\
             bar_id: also not a path var\r\n\
             foo_id: not a path var\r\n\r\n"
        );
    }

    #[test]
    fn test_parse() {
        let bytes = b"method path version\r\n\
            bad header\r\n\
            key : value\r\n\
            value_with_colon    : foo:bar\r\n\
            \r\n\
            {\n  \"body\" : \"content\"\n}";
        let msg = HttpReq::from_bytes(bytes, json_body).unwrap();
        assert_eq!(
            msg.assertable(&[]).unwrap(),
            "method path version\r\n\
             key: value\r\n\
             value_with_colon: foo:bar\r\n\
             \r\n\
             {\n  \"body\" : \"content\"\n}"
        );
        assert_eq!(msg.method().unwrap(), "method");
    }

    #[test]
    fn test_body_parse_failure() {
        let head = "method path version\r\nkey: value\r\n\r\n";
        let template = HttpReq::from_bytes(head.as_bytes(), |_| {
            Ok(Some(Box::new(WebSequence::<()>::new()) as Box<dyn Message>))
        })
        .unwrap();

        let err = template
            .peer(format!("{head}bad data").as_bytes())
            .unwrap_err();
        match err {
            MessageError::Parse { codec, text, .. } => {
                assert_eq!(codec, "web");
                assert_eq!(text, "bad data");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_child_inherits() {
        let mut msg = populated();
        msg.set(HTTP_PATH, "/foo/bar").unwrap();
        let mut child = msg.child();
        child
            .set(HTTP_METHOD, "PUT")
            .unwrap()
            .set("body", "child content")
            .unwrap();
        msg.set(HTTP_VERSION, "HTTP/2.0").unwrap();

        assert_eq!(
            msg.assertable(&[]).unwrap(),
            "method /foo/bar HTTP/2.0\r\nkey: value\r\n\r\n{\n  \"body\" : \"content\"\n}"
        );
        assert_eq!(
            child.assertable(&[]).unwrap(),
            "PUT /foo/bar HTTP/2.0\r\nkey: value\r\n\r\n{\n  \"body\" : \"child content\"\n}"
        );
    }

    #[test]
    fn test_chunked() {
        let mut msg = HttpReq::new()
            .with(HTTP_METHOD, "GET")
            .unwrap()
            .with(HTTP_PATH, "/foo/bar")
            .unwrap()
            .with(HTTP_VERSION, "HTTP/1.1")
            .unwrap()
            .with(&header("Transfer-Encoding"), "chunked")
            .unwrap()
            .with_body(Json::new());
        msg.set("body", "content").unwrap();

        assert_eq!(
            msg.assertable(&[]).unwrap(),
            "GET /foo/bar HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n{\n  \"body\" : \"content\"\n}"
        );
        let content = msg.content().unwrap();
        assert_eq!(
            String::from_utf8(content.clone()).unwrap(),
            "GET /foo/bar HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
             12\r\n{\"body\":\"content\"}\r\n0\r\n\r\n"
        );

        let parsed = HttpReq::from_bytes(&content, json_body).unwrap();
        assert_eq!(
            parsed.body_text().unwrap(),
            "{\n  \"body\" : \"content\"\n}"
        );
    }

    #[test]
    fn test_masking_peer() {
        let mut body = Json::new();
        body.masking(&Rng, |m| m.replace("body", "masked")).unwrap();

        let mut msg = HttpReq::new()
            .with(HTTP_METHOD, "GET")
            .unwrap()
            .with(HTTP_PATH, "/foo/%p%/bar?q=%q%&r=%r%")
            .unwrap()
            .with(HTTP_VERSION, "HTTP/1.1")
            .unwrap()
            .with(&header("Transfer-Encoding"), "chunked")
            .unwrap()
            .with(&path_var("p"), "path")
            .unwrap()
            .with(&path_var("q"), "valu")
            .unwrap()
            .with(&path_var("r"), "ulav")
            .unwrap()
            .with_body(body);
        msg.set("body", "content")
            .unwrap()
            .masking(&Rng, |m| {
                m.replace(&path_var("p"), "_mp_")
                    .replace(&path_var("q"), "_mq_")
                    .replace(&path_var("r"), "_mr_")
            })
            .unwrap();

        let peer = msg.peer(&msg.content().unwrap()).unwrap();
        assert_eq!(peer.get(&path_var("q")).unwrap(), Some(Value::from("valu")));
        assert_eq!(peer.get(HTTP_PATH).unwrap(), Some(Value::from("/foo/%p%/bar?q=%q%&r=%r%")));
        assert_eq!(
            peer.assertable(&[&Rng]).unwrap(),
            "GET /foo/_mp_/bar?q=_mq_&r=_mr_ HTTP/1.1\r\n\
             Transfer-Encoding: chunked\r\n\
             \r\n\
             {\n  \"body\" : \"masked\"\n}"
        );
        assert_eq!(
            peer.assertable(&[]).unwrap(),
            "GET /foo/path/bar?q=valu&r=ulav HTTP/1.1\r\n\
             Transfer-Encoding: chunked\r\n\
             \r\n\
             {\n  \"body\" : \"content\"\n}"
        );
    }

    #[test]
    fn test_missing_fields_survive_round_trip() {
        let full = HttpReq::new()
            .with(HTTP_METHOD, "GET")
            .unwrap()
            .with(HTTP_PATH, "/path/to?q=uery")
            .unwrap()
            .with(HTTP_VERSION, "HTTP/1.1")
            .unwrap()
            .with(&header("header"), "value")
            .unwrap()
            .with_body(Json::new());

        for missing in [
            vec![HTTP_METHOD],
            vec![HTTP_PATH, HTTP_BODY],
            vec![HTTP_VERSION, "^header^"],
            vec![HTTP_METHOD, HTTP_PATH, HTTP_VERSION, "^header^", HTTP_BODY],
        ] {
            let mut partial = full.child();
            for field in &missing {
                partial.set(field, DELETE).unwrap();
            }
            let parsed = partial.peer(&partial.content().unwrap()).unwrap();
            assert_eq!(
                partial.assertable(&[]).unwrap(),
                parsed.assertable(&[]).unwrap(),
                "missing {missing:?}"
            );
        }
    }

    #[test]
    fn test_body_updates_without_body_are_dropped() {
        let mut msg = HttpReq::new();
        msg.set("body", "content").unwrap();
        assert_eq!(msg.get("body").unwrap(), None);
        assert!(matches!(
            msg.set(HTTP_BODY, 12).unwrap_err(),
            MessageError::InvalidValue { .. }
        ));
        msg.set(HTTP_BODY, "plain").unwrap();
        assert_eq!(msg.body().map(|b| b.codec()), Some("text"));
        assert_eq!(msg.body_text().unwrap(), "plain");
    }
}
