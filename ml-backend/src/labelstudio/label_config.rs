/// Reading control/object names out of a Label Studio labeling config.

use regex::Regex;
use std::sync::OnceLock;

/// `name`/`toName` of a `<RectangleLabels>` control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RectangleTag {
    pub from_name: String,
    pub to_name: String,
}

/// First `<RectangleLabels>` control in the config, if it names both ends.
pub fn rectangle_tag(schema: &str) -> Option<RectangleTag> {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    static ATTR_RE: OnceLock<Regex> = OnceLock::new();
    let tag_re = TAG_RE.get_or_init(|| Regex::new(r"<RectangleLabels\b([^>]*)>").unwrap());
    let attr_re =
        ATTR_RE.get_or_init(|| Regex::new(r#"\b([A-Za-z_]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());

    let attrs = tag_re.captures(schema)?.get(1)?.as_str();

    let mut from_name = None;
    let mut to_name = None;
    for caps in attr_re.captures_iter(attrs) {
        let value = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str().to_string());
        match &caps[1] {
            "name" => from_name = value,
            "toName" => to_name = value,
            _ => {}
        }
    }

    Some(RectangleTag {
        from_name: from_name?,
        to_name: to_name?,
    })
}
