// ── Key-path flattening ──
//
// `{ "label": "l1", "color": { "hue": 1 } }` -> `["label", "color", "color.hue"]`

use serde_json::{Map, Value, map};

/// Dotted key paths of a record, pre-order.
///
/// An object contributes its bare key, then its children prefixed with that
/// key only: `{a: {b: {c: 1}}}` yields `a`, `b`, `b.c`. Scalars, arrays and
/// nulls are leaves. Order follows the map's key order, so the result is
/// stable for a fixed record shape.
pub fn flatten(record: &Map<String, Value>) -> Vec<String> {
    let mut paths = Vec::new();
    let mut stack: Vec<(Option<String>, map::Iter<'_>)> = vec![(None, record.iter())];

    while let Some((prefix, entries)) = stack.last_mut() {
        let Some((key, value)) = entries.next() else {
            stack.pop();
            continue;
        };

        if let Value::Object(children) = value {
            paths.push(key.clone());
            stack.push((Some(key.clone()), children.iter()));
            continue;
        }

        paths.push(match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        });
    }

    paths
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn paths(value: Value) -> Vec<String> {
        flatten(value.as_object().unwrap())
    }

    #[test]
    fn objects_emit_self_then_children() {
        assert_eq!(
            paths(json!({ "label": "light1", "color": { "hue": 122, "kelvin": 3500 }, "on": true })),
            ["label", "color", "color.hue", "color.kelvin", "on"]
        );
    }

    #[test]
    fn nested_objects_restart_the_prefix() {
        assert_eq!(paths(json!({ "a": { "b": { "c": 1 } } })), ["a", "b", "b.c"]);
        assert_eq!(
            paths(json!({ "a": { "b": { "c": 1 }, "d": 2 }, "e": 3 })),
            ["a", "b", "b.c", "a.d", "e"]
        );
    }

    #[test]
    fn arrays_and_nulls_are_leaves() {
        assert_eq!(
            paths(json!({ "zones": [{ "hue": 1 }], "group": null, "empty": {} })),
            ["zones", "group", "empty"]
        );
    }

    #[test]
    fn flattening_is_repeatable() {
        let record = json!({ "id": "d1", "color": { "hue": 1 }, "on": false });
        assert_eq!(paths(record.clone()), paths(record));
    }
}
