//! Query-string parsing and matching for the in-memory index.
//!
//! Supports the everyday subset of Lucene query-string syntax: bare terms,
//! `field:term`, quoted phrases, trailing-`*` prefixes, `*` (everything),
//! `field:*` (field present), `AND`/`OR`/`NOT` (also `&&`, `||`, `!`), `+`/`-`
//! prefixes and parentheses. Juxtaposed clauses are OR-ed. Terms are analyzed
//! like documents, so matching is case-insensitive.

use std::iter::Peekable;
use std::str::Chars;

use super::document::{analyze, IndexedDocument};

/// Parsed search query.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    MatchAll,
    /// Every token occurs in one value of the addressed field(s).
    Term { field: Option<String>, tokens: Vec<String> },
    /// Tokens occur consecutively in one value.
    Phrase { field: Option<String>, tokens: Vec<String> },
    /// Leading tokens occur and some token starts with `prefix`.
    Prefix {
        field: Option<String>,
        leading: Vec<String>,
        prefix: String,
    },
    Exists { field: String },
    Bool(BoolQuery),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    pub must: Vec<Query>,
    pub should: Vec<Query>,
    pub must_not: Vec<Query>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occur {
    Must,
    Should,
    MustNot,
}

impl BoolQuery {
    fn push(&mut self, occur: Occur, query: Query) {
        match occur {
            Occur::Must => self.must.push(query),
            Occur::Should => self.should.push(query),
            Occur::MustNot => self.must_not.push(query),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("unexpected end of query")]
    UnexpectedEnd,
    #[error("unexpected `{0}`")]
    Unexpected(String),
    #[error("unterminated phrase")]
    UnterminatedPhrase,
    #[error("missing closing parenthesis")]
    Unbalanced,
    #[error("groups nested deeper than {} levels", MAX_GROUP_DEPTH)]
    TooDeep,
}

/// Deepest group nesting the parser accepts.
pub const MAX_GROUP_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Colon,
    Plus,
    Minus,
    And,
    Or,
    Not,
    Word(String),
    Phrase(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Colon => ":".into(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::And => "AND".into(),
            Token::Or => "OR".into(),
            Token::Not => "NOT".into(),
            Token::Word(w) => w.clone(),
            Token::Phrase(p) => format!("\"{p}\""),
        }
    }
}

fn is_word_break(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | ':' | '"')
}

fn lex(input: &str) -> Result<Vec<Token>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ':' => {
                chars.next();
                tokens.push(Token::Colon);
            }
            '"' => {
                chars.next();
                tokens.push(Token::Phrase(lex_phrase(&mut chars)?));
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '!' => {
                chars.next();
                tokens.push(Token::Not);
            }
            _ => {
                let word = lex_word(&mut chars);
                tokens.push(match word.as_str() {
                    "AND" | "&&" => Token::And,
                    "OR" | "||" => Token::Or,
                    "NOT" => Token::Not,
                    _ => Token::Word(word),
                });
            }
        }
    }
    Ok(tokens)
}

fn lex_phrase(chars: &mut Peekable<Chars<'_>>) -> Result<String, QueryError> {
    let mut phrase = String::new();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Ok(phrase),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    phrase.push(escaped);
                }
            }
            c => phrase.push(c),
        }
    }
    Err(QueryError::UnterminatedPhrase)
}

fn lex_word(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut word = String::new();
    while let Some(&c) = chars.peek() {
        if is_word_break(c) {
            break;
        }
        chars.next();
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                word.push(escaped);
            }
        } else {
            word.push(c);
        }
    }
    word
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self, field: Option<&str>) -> Result<Query, QueryError> {
        let mut clauses: Vec<(Occur, Query)> = Vec::new();
        let mut dangling_or = false;

        loop {
            match self.peek() {
                None | Some(Token::RParen) => break,
                Some(Token::Or) => {
                    if clauses.is_empty() || dangling_or {
                        return Err(QueryError::Unexpected("OR".into()));
                    }
                    self.pos += 1;
                    dangling_or = true;
                }
                Some(_) => {
                    clauses.push(self.parse_and(field)?);
                    dangling_or = false;
                }
            }
        }

        if dangling_or || clauses.is_empty() {
            return Err(match self.peek() {
                Some(t) => QueryError::Unexpected(t.describe()),
                None => QueryError::UnexpectedEnd,
            });
        }
        if clauses.len() == 1 && clauses[0].0 == Occur::Should {
            return Ok(clauses.remove(0).1);
        }

        let mut bool_query = BoolQuery::default();
        for (occur, query) in clauses {
            bool_query.push(occur, query);
        }
        Ok(Query::Bool(bool_query))
    }

    fn parse_and(&mut self, field: Option<&str>) -> Result<(Occur, Query), QueryError> {
        let first = self.parse_unary(field)?;
        if self.peek() != Some(&Token::And) {
            return Ok(first);
        }

        let mut conjunction = BoolQuery::default();
        let mut add = |(occur, query): (Occur, Query)| {
            let occur = if occur == Occur::MustNot { Occur::MustNot } else { Occur::Must };
            conjunction.push(occur, query);
        };
        add(first);
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            add(self.parse_unary(field)?);
        }
        Ok((Occur::Should, Query::Bool(conjunction)))
    }

    fn parse_unary(&mut self, field: Option<&str>) -> Result<(Occur, Query), QueryError> {
        let occur = match self.peek() {
            Some(Token::Plus) => Occur::Must,
            Some(Token::Minus) | Some(Token::Not) => Occur::MustNot,
            _ => return Ok((Occur::Should, self.parse_primary(field)?)),
        };
        self.pos += 1;
        Ok((occur, self.parse_primary(field)?))
    }

    fn parse_primary(&mut self, field: Option<&str>) -> Result<Query, QueryError> {
        match self.next() {
            None => Err(QueryError::UnexpectedEnd),
            Some(Token::LParen) => self.parse_group(field),
            Some(Token::Phrase(text)) => Ok(Query::Phrase {
                field: field.map(str::to_string),
                tokens: analyze(&text),
            }),
            Some(Token::Word(word)) => {
                if self.peek() != Some(&Token::Colon) {
                    return Ok(term(field, &word));
                }
                self.pos += 1;
                match self.next() {
                    None => Err(QueryError::UnexpectedEnd),
                    Some(Token::LParen) => self.parse_group(Some(&word)),
                    Some(Token::Phrase(text)) => Ok(Query::Phrase {
                        field: Some(word),
                        tokens: analyze(&text),
                    }),
                    Some(Token::Word(value)) => Ok(term(Some(&word), &value)),
                    Some(other) => Err(QueryError::Unexpected(other.describe())),
                }
            }
            Some(other) => Err(QueryError::Unexpected(other.describe())),
        }
    }

    fn parse_group(&mut self, field: Option<&str>) -> Result<Query, QueryError> {
        if self.depth >= MAX_GROUP_DEPTH {
            return Err(QueryError::TooDeep);
        }
        self.depth += 1;
        let inner = self.parse_or(field);
        self.depth -= 1;
        let inner = inner?;
        match self.next() {
            Some(Token::RParen) => Ok(inner),
            _ => Err(QueryError::Unbalanced),
        }
    }
}

fn term(field: Option<&str>, word: &str) -> Query {
    let field = field.map(str::to_string);
    if let Some(stem) = word.strip_suffix('*') {
        let mut tokens = analyze(stem);
        return match (tokens.pop(), field) {
            (None, None) => Query::MatchAll,
            (None, Some(field)) => Query::Exists { field },
            (Some(prefix), field) => Query::Prefix {
                field,
                leading: tokens,
                prefix,
            },
        };
    }
    Query::Term {
        field,
        tokens: analyze(word),
    }
}

/// Parse a query string. Blank input matches everything.
pub fn parse(input: &str) -> Result<Query, QueryError> {
    let tokens = lex(input)?;
    if tokens.is_empty() {
        return Ok(Query::MatchAll);
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let query = parser.parse_or(None)?;
    match parser.next() {
        None => Ok(query),
        Some(Token::RParen) => Err(QueryError::Unexpected(")".into())),
        Some(other) => Err(QueryError::Unexpected(other.describe())),
    }
}

fn contains_all(value: &[String], tokens: &[String]) -> bool {
    !tokens.is_empty() && tokens.iter().all(|t| value.contains(t))
}

fn contains_sequence(value: &[String], tokens: &[String]) -> bool {
    !tokens.is_empty() && value.windows(tokens.len()).any(|w| w == tokens)
}

fn count_values(doc: &IndexedDocument, field: Option<&str>, matches: impl Fn(&[String]) -> bool) -> u32 {
    let hits = doc
        .fields_named(field)
        .flat_map(|f| f.values.iter())
        .filter(|v| matches(v))
        .count();
    u32::try_from(hits).unwrap_or(u32::MAX)
}

impl Query {
    /// Relevance of `doc` for this query, `None` when it does not match.
    pub fn score(&self, doc: &IndexedDocument) -> Option<u32> {
        let hits = match self {
            Query::MatchAll => return Some(0),
            Query::Term { field, tokens } => {
                count_values(doc, field.as_deref(), |v| contains_all(v, tokens))
            }
            Query::Phrase { field, tokens } => {
                count_values(doc, field.as_deref(), |v| contains_sequence(v, tokens))
            }
            Query::Prefix {
                field,
                leading,
                prefix,
            } => count_values(doc, field.as_deref(), |v| {
                leading.iter().all(|t| v.contains(t)) && v.iter().any(|t| t.starts_with(prefix.as_str()))
            }),
            Query::Exists { field } => count_values(doc, Some(field), |v| !v.is_empty()),
            Query::Bool(b) => return b.score(doc),
        };
        (hits > 0).then_some(hits)
    }

    pub fn matches(&self, doc: &IndexedDocument) -> bool {
        self.score(doc).is_some()
    }
}

impl BoolQuery {
    fn score(&self, doc: &IndexedDocument) -> Option<u32> {
        if self.must_not.iter().any(|q| q.matches(doc)) {
            return None;
        }
        let mut total = 0u32;
        for q in &self.must {
            total = total.saturating_add(q.score(doc)?);
        }
        let mut any_should = false;
        for q in &self.should {
            if let Some(s) = q.score(doc) {
                any_should = true;
                total = total.saturating_add(s);
            }
        }
        if self.must.is_empty() && !self.should.is_empty() && !any_should {
            return None;
        }
        Some(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> IndexedDocument {
        IndexedDocument::from_json(&value)
    }

    fn hall() -> IndexedDocument {
        doc(json!({"id": 1, "name": "Main Hall", "description": "Old stone building", "floors": 3}))
    }

    fn annex() -> IndexedDocument {
        doc(json!({"id": 2, "name": "Annex", "description": "New wing next to the hall", "floors": 1}))
    }

    #[test]
    fn blank_and_star_match_everything() {
        assert_eq!(parse("").unwrap(), Query::MatchAll);
        assert_eq!(parse("   ").unwrap(), Query::MatchAll);
        assert_eq!(parse("*").unwrap(), Query::MatchAll);
        assert!(parse("*").unwrap().matches(&annex()));
    }

    #[test]
    fn bare_terms_are_case_insensitive_and_search_all_fields() {
        let q = parse("HALL").unwrap();
        assert!(q.matches(&hall()));
        assert!(q.matches(&annex()));
        assert!(!parse("basement").unwrap().matches(&hall()));
    }

    #[test]
    fn field_terms_only_look_at_that_field() {
        let q = parse("name:hall").unwrap();
        assert!(q.matches(&hall()));
        assert!(!q.matches(&annex()));
        assert!(parse("floors:3").unwrap().matches(&hall()));
    }

    #[test]
    fn juxtaposition_is_or_and_explicit_and_narrows() {
        let either = parse("annex stone").unwrap();
        assert!(either.matches(&hall()));
        assert!(either.matches(&annex()));

        let both = parse("hall AND stone").unwrap();
        assert!(both.matches(&hall()));
        assert!(!both.matches(&annex()));
    }

    #[test]
    fn required_and_prohibited_clauses() {
        let q = parse("+hall -wing").unwrap();
        assert!(q.matches(&hall()));
        assert!(!q.matches(&annex()));

        let negated = parse("NOT name:annex").unwrap();
        assert!(negated.matches(&hall()));
        assert!(!negated.matches(&annex()));
    }

    #[test]
    fn phrases_need_consecutive_tokens() {
        assert!(parse("\"main hall\"").unwrap().matches(&hall()));
        assert!(!parse("\"hall main\"").unwrap().matches(&hall()));
        assert!(parse("description:\"next to\"").unwrap().matches(&annex()));
    }

    #[test]
    fn prefix_and_exists() {
        assert!(parse("name:ann*").unwrap().matches(&annex()));
        assert!(!parse("name:ann*").unwrap().matches(&hall()));
        assert!(parse("floors:*").unwrap().matches(&hall()));
        assert!(!parse("address:*").unwrap().matches(&hall()));
    }

    #[test]
    fn groups_scope_fields_and_operators() {
        let q = parse("name:(annex OR main) AND NOT description:stone").unwrap();
        assert!(!q.matches(&hall()));
        assert!(q.matches(&annex()));
    }

    #[test]
    fn more_hits_score_higher() {
        let q = parse("hall building").unwrap();
        assert!(q.score(&hall()).unwrap() > q.score(&annex()).unwrap());
    }

    #[test]
    fn syntax_errors_are_reported() {
        assert_eq!(parse("(hall"), Err(QueryError::Unbalanced));
        assert_eq!(parse("hall)"), Err(QueryError::Unexpected(")".into())));
        assert_eq!(parse("\"open"), Err(QueryError::UnterminatedPhrase));
        assert_eq!(parse("hall AND"), Err(QueryError::UnexpectedEnd));
        assert_eq!(parse("OR hall"), Err(QueryError::Unexpected("OR".into())));
        assert_eq!(parse("name:"), Err(QueryError::UnexpectedEnd));
    }

    #[test]
    fn runaway_nesting_is_rejected() {
        let opens = "(".repeat(100_000);
        assert_eq!(parse(&opens), Err(QueryError::TooDeep));

        let balanced = format!("{}hall{}", "(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(parse(&balanced), Err(QueryError::TooDeep));

        let fielded = "name:(".repeat(10_000);
        assert_eq!(parse(&fielded), Err(QueryError::TooDeep));
    }

    #[test]
    fn nesting_up_to_the_limit_parses() {
        let deepest = format!(
            "{}hall{}",
            "(".repeat(MAX_GROUP_DEPTH),
            ")".repeat(MAX_GROUP_DEPTH)
        );
        assert!(parse(&deepest).unwrap().matches(&hall()));

        let one_more = format!(
            "{}hall{}",
            "(".repeat(MAX_GROUP_DEPTH + 1),
            ")".repeat(MAX_GROUP_DEPTH + 1)
        );
        assert_eq!(parse(&one_more), Err(QueryError::TooDeep));
    }

    #[test]
    fn sibling_groups_do_not_accumulate_depth() {
        let siblings = "(annex) ".repeat(MAX_GROUP_DEPTH * 4);
        assert!(parse(&siblings).unwrap().matches(&annex()));
    }

    #[test]
    fn long_flat_queries_parse() {
        let mut input = "hall OR ".repeat(50_000);
        input.push_str("annex");
        let q = parse(&input).unwrap();
        assert!(q.matches(&hall()));
        assert!(q.matches(&annex()));

        let conjunction = vec!["hall"; 50_000].join(" AND ");
        assert!(parse(&conjunction).unwrap().matches(&hall()));
    }

    #[test]
    fn unbalanced_parentheses_at_depth() {
        assert_eq!(parse("((hall)))"), Err(QueryError::Unexpected(")".into())));
        assert_eq!(parse("(((hall))"), Err(QueryError::Unbalanced));
        assert_eq!(parse("name:((hall) annex"), Err(QueryError::Unbalanced));
        assert_eq!(parse("((()))"), Err(QueryError::Unexpected(")".into())));
    }

    proptest! {
        #[test]
        fn parser_never_panics(input in "[a-zA-Z0-9 :()\"*+!&|-]{0,40}") {
            let _ = parse(&input);
        }

        #[test]
        fn single_words_match_their_own_document(word in "[a-z][a-z0-9]{0,12}") {
            let d = doc(json!({"name": word.to_uppercase()}));
            prop_assert!(parse(&word).unwrap().matches(&d));
        }
    }
}
