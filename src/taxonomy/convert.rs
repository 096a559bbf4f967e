//! Converters from raw marketplace taxonomy exports to standard TSV rows.
//!
//! Shopify ships a `gid://... : text` listing, Ozon and Yandex ship nested JSON
//! trees. Tree converters flatten every node to its full ` > `-joined path.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::Category;

const PATH_SEPARATOR: &str = " > ";

static SHOPIFY_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(gid://\S+)\s+:\s+(.+)$").expect("static regex"));

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("malformed export: {0}")]
    Json(#[from] serde_json::Error),

    #[error("export is missing `{0}`")]
    MissingField(&'static str),
}

/// Result of a conversion: accepted rows and how many input records were skipped.
#[derive(Debug, Default)]
pub struct Converted {
    pub rows: Vec<Category>,
    pub skipped: usize,
}

/// Convert a Shopify taxonomy listing (`gid://shopify/TaxonomyCategory/aa : Apparel`).
///
/// Blank lines are ignored; comments and lines that don't match are counted as skipped.
pub fn convert_shopify(content: &str) -> Converted {
    let mut out = Converted::default();

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        if line.trim_start().starts_with('#') {
            out.skipped += 1;
            continue;
        }

        match SHOPIFY_LINE.captures(line) {
            Some(caps) => {
                let id = caps[1].trim();
                let text = caps[2].trim();
                out.rows.push(Category::new(id, text));
            }
            None => {
                log::warn!("line {} does not match shopify format, skipped", line_num + 1);
                out.skipped += 1;
            }
        }
    }

    out
}

#[derive(Debug, Deserialize)]
struct OzonNode {
    description_category_id: Option<Value>,
    category_name: Option<String>,
    type_id: Option<Value>,
    type_name: Option<String>,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    children: Vec<OzonNode>,
}

/// Convert an Ozon category tree export (`{"result": [...]}`).
///
/// Disabled nodes are dropped together with their subtree.
pub fn convert_ozon(content: &str) -> Result<Converted, ConvertError> {
    #[derive(Deserialize)]
    struct Export {
        result: Option<Vec<OzonNode>>,
    }

    let export: Export = serde_json::from_str(content)?;
    let nodes = export.result.ok_or(ConvertError::MissingField("result"))?;

    let mut out = Converted::default();
    flatten_ozon(&nodes, "", &mut out);
    Ok(out)
}

fn flatten_ozon(nodes: &[OzonNode], parent: &str, out: &mut Converted) {
    for node in nodes {
        let (id, name) = match (
            &node.description_category_id,
            &node.category_name,
            &node.type_id,
            &node.type_name,
        ) {
            (Some(id), Some(name), _, _) => (id, name),
            (_, _, Some(id), Some(name)) => (id, name),
            _ => {
                out.skipped += 1;
                continue;
            }
        };

        if node.disabled {
            out.skipped += 1;
            continue;
        }

        let path = join_path(parent, name);
        out.rows.push(Category::new(json_id(id), path.clone()));
        flatten_ozon(&node.children, &path, out);
    }
}

#[derive(Debug, Deserialize)]
struct YandexNode {
    id: Option<Value>,
    name: Option<String>,
    #[serde(default)]
    children: Vec<YandexNode>,
}

/// Convert a Yandex Market category tree export (`{"result": {root node}}`).
///
/// The root is the catch-all "all goods" node; only its descendants become rows.
pub fn convert_yandex(content: &str) -> Result<Converted, ConvertError> {
    #[derive(Deserialize)]
    struct Export {
        result: Option<YandexNode>,
    }

    let export: Export = serde_json::from_str(content)?;
    let root = export.result.ok_or(ConvertError::MissingField("result"))?;

    let mut out = Converted::default();
    for child in &root.children {
        flatten_yandex(child, "", &mut out);
    }
    Ok(out)
}

fn flatten_yandex(node: &YandexNode, parent: &str, out: &mut Converted) {
    let (Some(id), Some(name)) = (&node.id, &node.name) else {
        out.skipped += 1;
        return;
    };
    let id = json_id(id);
    if id.is_empty() || name.is_empty() {
        out.skipped += 1;
        return;
    }

    let path = join_path(parent, name);
    out.rows.push(Category::new(id, path.clone()));
    for child in &node.children {
        flatten_yandex(child, &path, out);
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}{PATH_SEPARATOR}{name}")
    }
}

/// Ids show up as numbers in one export and strings in another.
fn json_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shopify_listing() {
        let content = "# Shopify taxonomy\n\
            gid://shopify/TaxonomyCategory/ap            : Animals & Pet Supplies\n\
            \n\
            gid://shopify/TaxonomyCategory/ap-1 : Animals & Pet Supplies > Live Animals\n\
            garbage line\n";

        let converted = convert_shopify(content);
        assert_eq!(
            converted.rows,
            vec![
                Category::new("gid://shopify/TaxonomyCategory/ap", "Animals & Pet Supplies"),
                Category::new(
                    "gid://shopify/TaxonomyCategory/ap-1",
                    "Animals & Pet Supplies > Live Animals"
                ),
            ]
        );
        assert_eq!(converted.skipped, 2);
    }

    #[test]
    fn test_ozon_tree() {
        let content = r#"{"result": [
            {"description_category_id": 17027484, "category_name": "Electronics", "children": [
                {"description_category_id": 17028922, "category_name": "Mice", "children": [
                    {"type_id": 970, "type_name": "Wireless mouse"}
                ]},
                {"description_category_id": 1, "category_name": "Hidden", "disabled": true, "children": [
                    {"type_id": 2, "type_name": "Never seen"}
                ]}
            ]}
        ]}"#;

        let converted = convert_ozon(content).unwrap();
        assert_eq!(
            converted.rows,
            vec![
                Category::new("17027484", "Electronics"),
                Category::new("17028922", "Electronics > Mice"),
                Category::new("970", "Electronics > Mice > Wireless mouse"),
            ]
        );
        assert_eq!(converted.skipped, 1);
    }

    #[test]
    fn test_ozon_missing_result() {
        let result = convert_ozon(r#"{"items": []}"#);
        assert!(matches!(result, Err(ConvertError::MissingField("result"))));
    }

    #[test]
    fn test_yandex_tree() {
        let content = r#"{"result": {"id": 90401, "name": "All goods", "children": [
            {"id": 198118, "name": "Appliances", "children": [
                {"id": "90586", "name": "Kettles"}
            ]},
            {"name": "no id"}
        ]}}"#;

        let converted = convert_yandex(content).unwrap();
        assert_eq!(
            converted.rows,
            vec![
                Category::new("198118", "Appliances"),
                Category::new("90586", "Appliances > Kettles"),
            ]
        );
        assert_eq!(converted.skipped, 1);
    }

    #[test]
    fn test_yandex_root_only() {
        let converted =
            convert_yandex(r#"{"result": {"id": 90401, "name": "All goods"}}"#).unwrap();
        assert!(converted.rows.is_empty());
        assert_eq!(converted.skipped, 0);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(convert_yandex("not json"), Err(ConvertError::Json(_))));
    }
}
