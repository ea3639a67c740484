use tantivy::schema::{Field, Schema, FAST, STORED, STRING, TEXT};
use tantivy::tokenizer::{LowerCaser, TextAnalyzer, Token, TokenStream, Tokenizer};
use tantivy::Index;

pub const PATH_TOKENIZER: &str = "path_tokenizer";

#[derive(Clone)]
pub struct IndexFields {
    pub id: Field,
    pub name: Field,
    pub extension: Field,
    pub path: Field,
    pub project: Field,
    pub version: Field,
    pub content: Field,
    pub size: Field,
    pub last_author: Field,
    pub last_date: Field,
}

/// Shared across every per-repository index, so a schema mismatch between
/// an on-disk index and the running binary is a configuration error rather
/// than silent drift.
pub fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    builder.add_text_field("id", STRING | STORED);
    builder.add_text_field("name", TEXT | STORED);
    builder.add_text_field("extension", STRING | STORED | FAST);

    let path_indexing = tantivy::schema::TextFieldIndexing::default()
        .set_tokenizer(PATH_TOKENIZER)
        .set_index_option(tantivy::schema::IndexRecordOption::WithFreqsAndPositions);
    let path_options = tantivy::schema::TextOptions::default()
        .set_indexing_options(path_indexing)
        .set_stored();
    builder.add_text_field("path", path_options);

    builder.add_text_field("project", STRING | STORED | FAST);
    builder.add_text_field("version", STRING | STORED | FAST);
    builder.add_text_field("content", TEXT | STORED);
    builder.add_u64_field("size", FAST | STORED);
    builder.add_text_field("last_author", STRING | STORED);
    builder.add_text_field("last_date", STRING | STORED);

    builder.build()
}

pub fn extract_fields(schema: &Schema) -> IndexFields {
    IndexFields {
        id: schema.get_field("id").expect("id field should exist"),
        name: schema.get_field("name").expect("name field should exist"),
        extension: schema.get_field("extension").expect("extension field should exist"),
        path: schema.get_field("path").expect("path field should exist"),
        project: schema.get_field("project").expect("project field should exist"),
        version: schema.get_field("version").expect("version field should exist"),
        content: schema.get_field("content").expect("content field should exist"),
        size: schema.get_field("size").expect("size field should exist"),
        last_author: schema.get_field("last_author").expect("last_author field should exist"),
        last_date: schema.get_field("last_date").expect("last_date field should exist"),
    }
}

/// Registers the path tokenizer (splits on `/`, `.`, `@` in addition to the
/// default simple-tokenizer boundaries) on `index`. Must be called once per
/// `Index` handle before it's used to build a writer or reader.
pub fn register_path_tokenizer(index: &Index) {
    let analyzer = TextAnalyzer::builder(PathSegmentTokenizer)
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(PATH_TOKENIZER, analyzer);
}

/// Wraps [`SimpleTokenizer`]'s output and splits further on `/`, `.`, `@`,
/// so a query for `handlers` matches `src/api/handlers.rs`.
#[derive(Clone)]
struct PathSegmentTokenizer;

impl Tokenizer for PathSegmentTokenizer {
    type TokenStream<'a> = PathSegmentTokenStream;

    fn token_stream<'a>(&mut self, text: &'a str) -> Self::TokenStream<'a> {
        let tokens = split_on_path_separators(text)
            .into_iter()
            .enumerate()
            .map(|(position, (offset, piece))| Token {
                offset_from: offset,
                offset_to: offset + piece.len(),
                position,
                text: piece.to_string(),
                position_length: 1,
            })
            .collect();
        PathSegmentTokenStream { tokens, cursor: 0 }
    }
}

fn split_on_path_separators(text: &str) -> Vec<(usize, &str)> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if c == '/' || c == '.' || c == '@' {
            if i > start {
                pieces.push((start, &text[start..i]));
            }
            start = i + c.len_utf8();
        }
    }
    if start < text.len() {
        pieces.push((start, &text[start..]));
    }
    pieces
}

struct PathSegmentTokenStream {
    tokens: Vec<Token>,
    cursor: usize,
}

impl TokenStream for PathSegmentTokenStream {
    fn advance(&mut self) -> bool {
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn token(&self) -> &Token {
        &self.tokens[self.cursor - 1]
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.tokens[self.cursor - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_path_separators() {
        let pieces: Vec<&str> = split_on_path_separators("src/api/handlers.rs")
            .into_iter()
            .map(|(_, p)| p)
            .collect();
        assert_eq!(pieces, vec!["src", "api", "handlers", "rs"]);
    }

    #[test]
    fn splits_on_at_sign() {
        let pieces: Vec<&str> = split_on_path_separators("repo.git@main")
            .into_iter()
            .map(|(_, p)| p)
            .collect();
        assert_eq!(pieces, vec!["repo", "git", "main"]);
    }
}
