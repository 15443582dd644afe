//! Property tests for the byte-range and tree-path engines.

use flow_message::codec::{Bytes, Json};
use flow_message::{Message, Value};
use proptest::prelude::*;

/// Reference model of a byte-range write: clamp both bounds, then splice.
fn splice(array: &[u8], start: usize, end: usize, content: &[u8]) -> Vec<u8> {
    let s = start.min(array.len());
    let e = end.min(array.len()).max(s);
    [&array[..s], content, &array[e..]].concat()
}

fn arb_range() -> impl Strategy<Value = (usize, usize)> {
    (0usize..40, 0usize..40).prop_map(|(a, b)| (a.min(b), a.max(b)))
}

fn arb_key() -> impl Strategy<Value = String> {
    "[a-c]{1,3}"
}

proptest! {
    #[test]
    fn range_write_matches_splice(
        array in proptest::collection::vec(any::<u8>(), 0..32),
        (start, end) in arb_range(),
        content in proptest::collection::vec(any::<u8>(), 0..8),
    ) {
        let mut msg = Bytes::from_bytes(&array).unwrap();
        msg.set(&format!("{start}..{end}"), Value::Bytes(content.clone())).unwrap();
        prop_assert_eq!(msg.content().unwrap(), splice(&array, start, end, &content));
    }

    #[test]
    fn range_read_clamps(
        array in proptest::collection::vec(any::<u8>(), 0..32),
        (start, end) in arb_range(),
    ) {
        let msg = Bytes::from_bytes(&array).unwrap();
        let s = start.min(array.len());
        let e = end.min(array.len());
        prop_assert_eq!(
            msg.get(&format!("{start}..{end}")).unwrap(),
            Some(Value::Bytes(array[s..e].to_vec()))
        );
    }

    #[test]
    fn range_delete_removes(
        array in proptest::collection::vec(any::<u8>(), 0..32),
        (start, end) in arb_range(),
    ) {
        let mut msg = Bytes::from_bytes(&array).unwrap();
        msg.set(&format!("{start}..{end}"), flow_message::DELETE).unwrap();
        prop_assert_eq!(msg.content().unwrap(), splice(&array, start, end, &[]));
    }

    #[test]
    fn tree_set_then_get(
        keys in proptest::collection::vec(arb_key(), 1..4),
        value in any::<i64>(),
    ) {
        let field = keys.join(".");
        let mut msg = Json::new();
        msg.set(&field, value).unwrap();
        prop_assert_eq!(msg.get(&field).unwrap(), Some(Value::from(value)));
        prop_assert!(msg.fields().unwrap().contains(&field));
        prop_assert_eq!(msg.child().get(&field).unwrap(), Some(Value::from(value)));
    }

    #[test]
    fn tree_vivifies_list_padding(key in arb_key(), index in 0usize..6) {
        let mut msg = Json::new();
        msg.set(&format!("{key}[{index}]"), "x").unwrap();
        let list = msg.get(&key).unwrap();
        let list = list.as_ref().and_then(Value::as_list).unwrap();
        prop_assert_eq!(list.len(), index + 1);
        prop_assert!(list[..index].iter().all(Value::is_null));
    }
}
