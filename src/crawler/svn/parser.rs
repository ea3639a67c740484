//! Hand-rolled parsers for the slices of `svn --xml` output this crate
//! actually consumes. A dedicated XML crate would work too, but the
//! teacher's own SVN-adjacent tooling favors scanning for the handful of
//! tags it needs rather than pulling in a full parser, so this follows
//! that lead.

#[derive(Debug, Clone)]
pub struct SvnLogEntry {
    pub revision: i64,
    pub author: String,
    pub date: String,
    pub changed_paths: Vec<SvnChangedPath>,
}

#[derive(Debug, Clone)]
pub struct SvnChangedPath {
    pub action: char,
    pub path: String,
    pub kind: String,
    pub copy_from_path: Option<String>,
}

pub fn parse_svn_log(xml: &str) -> Vec<SvnLogEntry> {
    let mut entries = Vec::new();
    for part in xml.split("<logentry").skip(1) {
        let entry_xml = match part.find("</logentry>") {
            Some(pos) => &part[..pos],
            None => part,
        };
        let revision = extract_attribute_from_fragment(entry_xml, "revision")
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);
        let author = extract_tag_content(entry_xml, "author").unwrap_or_default();
        let date = extract_tag_content(entry_xml, "date").unwrap_or_default();
        let changed_paths = parse_changed_paths(entry_xml);
        entries.push(SvnLogEntry { revision, author, date, changed_paths });
    }
    entries
}

fn parse_changed_paths(entry_xml: &str) -> Vec<SvnChangedPath> {
    let mut paths = Vec::new();
    let paths_block = match entry_xml.find("<paths>") {
        Some(start) => {
            let rest = &entry_xml[start..];
            match rest.find("</paths>") {
                Some(end) => &rest[..end],
                None => return paths,
            }
        }
        None => return paths,
    };

    for part in paths_block.split("<path").skip(1) {
        let fragment = match part.find("</path>") {
            Some(pos) => &part[..pos],
            None => continue,
        };
        let action = extract_attribute_from_fragment(fragment, "action")
            .and_then(|s| s.chars().next())
            .unwrap_or('M');
        let kind = extract_attribute_from_fragment(fragment, "kind").unwrap_or_default();
        let copy_from_path = extract_attribute_from_fragment(fragment, "copyfrom-path");
        let path = match fragment.find('>') {
            Some(pos) => fragment[pos + 1..].trim().to_string(),
            None => String::new(),
        };
        paths.push(SvnChangedPath { action, path, kind, copy_from_path });
    }
    paths
}

/// `svn propget --xml` for a single property: `<target ...><property
/// name="...">value</property></target>`.
pub fn parse_propget(xml: &str) -> Option<String> {
    extract_tag_content(xml, "property")
}

fn extract_tag_content(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let start_pos = xml.find(&open)?;
    let after_open = &xml[start_pos + open.len()..];
    let content_start = after_open.find('>')? + 1;
    let content = &after_open[content_start..];
    let end_pos = content.find(&close)?;
    Some(content[..end_pos].trim().to_string())
}

fn extract_attribute_from_fragment(fragment: &str, attr: &str) -> Option<String> {
    let pattern_dq = format!("{}=\"", attr);
    if let Some(pos) = fragment.find(&pattern_dq) {
        let after = &fragment[pos + pattern_dq.len()..];
        let end = after.find('"')?;
        return Some(after[..end].to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_log_with_changed_paths() {
        let xml = r#"<log>
<logentry revision="110">
<author>alice</author><date>2025-01-10T00:00:00.000000Z</date>
<paths>
<path action="A" kind="file">/trunk/a.rs</path>
<path action="M" kind="file">/trunk/b.rs</path>
<path action="D" kind="file">/branches/legacy/c.rs</path>
</paths>
<msg>changes</msg>
</logentry>
</log>"#;
        let entries = parse_svn_log(xml);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].revision, 110);
        assert_eq!(entries[0].author, "alice");
        assert_eq!(entries[0].changed_paths.len(), 3);
        assert_eq!(entries[0].changed_paths[0].action, 'A');
        assert_eq!(entries[0].changed_paths[2].path, "/branches/legacy/c.rs");
    }

    #[test]
    fn parses_propget_value() {
        let xml = r#"<properties><target path="trunk/a.rs"><property name="svn:entry:last-author">alice</property></target></properties>"#;
        assert_eq!(parse_propget(xml), Some("alice".to_string()));
    }
}
