use serde::{Deserialize, Serialize};

/// Header line written by every converter.
pub const TSV_HEADER: &str = "category_id\tcategory_text";

/// A taxonomy node: stable id plus the text that gets embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub text: String,
}

impl Category {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Parse standard TSV content into categories, in file order.
///
/// The first line is always treated as a header. Rows are split on the first
/// tab only; rows without a tab, or with an empty id or text after trimming,
/// are dropped.
pub fn parse_tsv(content: &str) -> Vec<Category> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            if line.trim().is_empty() {
                return None;
            }

            let (id, text) = line.split_once('\t')?;
            let (id, text) = (id.trim(), text.trim());

            if id.is_empty() || text.is_empty() {
                return None;
            }

            Some(Category::new(id, text))
        })
        .collect()
}

/// Render categories back into standard TSV, header included.
pub fn render_tsv<'a>(rows: impl IntoIterator<Item = &'a Category>) -> String {
    let mut out = String::from(TSV_HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(&row.id);
        out.push('\t');
        out.push_str(&row.text);
        out.push('\n');
    }
    out
}
