//! # VisibleIf expressions
//!
//! ```text
//! Expr    := Group ('||' Group)*
//! Group   := Cond ('&&' Cond)*
//! Cond    := Path Op Literal
//! Op      := == | != | < | <= | > | >=
//! Path    := Segment ('.' Segment)*
//! Segment := Root | Parent | identifier
//! ```
//!
//! The literal is the raw source text between the operator and the next
//! `&&`/`||` (trimmed, surrounding double quotes removed), so values such as
//! `Fire, Ice` or `C:/textures` need no quoting. Evaluation against live
//! items happens in the editor; this module only parses.

use logos::Logos;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use thiserror::Error;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
enum Token {
    #[token("||")]
    Or,
    #[token("&&")]
    And,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Lte,
    #[token(">")]
    Gt,
    #[token(">=")]
    Gte,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    #[regex(r"-?[0-9]+(\.[0-9]+)?")]
    Number,

    #[regex(r#""[^"]*""#)]
    Quoted,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("expression is empty")]
    Empty,

    #[error("expected {expected} at byte {pos}, found '{found}'")]
    UnexpectedToken {
        pos: usize,
        expected: String,
        found: String,
    },

    #[error("unexpected end of expression, expected {expected}")]
    UnexpectedEnd { expected: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Equal => "==",
            CompareOp::NotEqual => "!=",
            CompareOp::Less => "<",
            CompareOp::LessOrEqual => "<=",
            CompareOp::Greater => ">",
            CompareOp::GreaterOrEqual => ">=",
        }
    }

    /// Ordering operators only apply to numeric targets.
    pub fn is_ordering(self) -> bool {
        !matches!(self, CompareOp::Equal | CompareOp::NotEqual)
    }

    pub fn compare_numbers(self, value: f64, literal: f64) -> bool {
        match self {
            CompareOp::Equal => value == literal,
            CompareOp::NotEqual => value != literal,
            CompareOp::Less => value < literal,
            CompareOp::LessOrEqual => value <= literal,
            CompareOp::Greater => value > literal,
            CompareOp::GreaterOrEqual => value >= literal,
        }
    }

    /// Map an equality outcome through `==`/`!=`. Ordering operators never
    /// reach here; they are rejected when the statement is bound.
    pub fn apply_equality(self, equal: bool) -> bool {
        match self {
            CompareOp::NotEqual => !equal,
            _ => equal,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Root,
    Parent,
    Name(String),
}

/// One `Path Op Literal` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub path: Vec<PathSegment>,
    pub op: CompareOp,
    pub literal: String,
}

impl Statement {
    /// `null` or an empty literal stands for "unset".
    pub fn literal_is_null(&self) -> bool {
        self.literal.is_empty() || self.literal.eq_ignore_ascii_case("null")
    }

    /// Comma-separated literals are matched as a set.
    pub fn literal_values(&self) -> impl Iterator<Item = &str> {
        self.literal.split(',').map(str::trim)
    }

    /// The whole literal, or any of its comma-separated values, equals `text`.
    pub fn literal_matches(&self, text: &str) -> bool {
        self.literal == text || self.literal_values().any(|literal| literal == text)
    }

    pub fn path_display(&self) -> String {
        self.path
            .iter()
            .map(|segment| match segment {
                PathSegment::Root => "Root",
                PathSegment::Parent => "Parent",
                PathSegment::Name(name) => name.as_str(),
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.path_display(), self.op, self.literal)
    }
}

/// Disjunction of conjunctions: visible when any group is entirely true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    pub source: String,
    pub groups: Vec<Vec<Statement>>,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        if source.trim().is_empty() {
            return Err(ExpressionError::Empty);
        }
        let mut parser = Parser::new(source);
        let groups = parser.parse_expression()?;
        Ok(Self {
            source: source.to_string(),
            groups,
        })
    }

    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.groups.iter().flatten()
    }
}

impl FromStr for Expression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Expression::parse(s)
    }
}

struct Parser<'src> {
    source: &'src str,
    tokens: Vec<(Result<Token, ()>, Range<usize>)>,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str) -> Self {
        let tokens = Token::lexer(source).spanned().collect();
        Self {
            source,
            tokens,
            pos: 0,
        }
    }

    fn parse_expression(&mut self) -> Result<Vec<Vec<Statement>>, ExpressionError> {
        let mut groups = vec![self.parse_group()?];
        while self.check(Token::Or) {
            self.advance();
            groups.push(self.parse_group()?);
        }
        if let Some((_, span)) = self.peek() {
            return Err(self.unexpected(span.clone(), "'||' or end of expression"));
        }
        Ok(groups)
    }

    fn parse_group(&mut self) -> Result<Vec<Statement>, ExpressionError> {
        let mut statements = vec![self.parse_statement()?];
        while self.check(Token::And) {
            self.advance();
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Statement, ExpressionError> {
        let path = self.parse_path()?;
        let op = self.expect_operator()?;
        let literal = self.parse_literal();
        Ok(Statement { path, op, literal })
    }

    fn parse_path(&mut self) -> Result<Vec<PathSegment>, ExpressionError> {
        let mut path = vec![self.expect_segment()?];
        while self.check(Token::Dot) {
            self.advance();
            path.push(self.expect_segment()?);
        }
        Ok(path)
    }

    fn expect_segment(&mut self) -> Result<PathSegment, ExpressionError> {
        match self.peek().cloned() {
            Some((Ok(Token::Ident), span)) => {
                self.advance();
                Ok(match &self.source[span] {
                    "Root" => PathSegment::Root,
                    "Parent" => PathSegment::Parent,
                    name => PathSegment::Name(name.to_string()),
                })
            }
            Some((_, span)) => Err(self.unexpected(span, "identifier")),
            None => Err(ExpressionError::UnexpectedEnd {
                expected: "identifier".to_string(),
            }),
        }
    }

    fn expect_operator(&mut self) -> Result<CompareOp, ExpressionError> {
        let op = match self.peek().cloned() {
            Some((Ok(Token::EqEq), _)) => CompareOp::Equal,
            Some((Ok(Token::NotEq), _)) => CompareOp::NotEqual,
            Some((Ok(Token::Lt), _)) => CompareOp::Less,
            Some((Ok(Token::Lte), _)) => CompareOp::LessOrEqual,
            Some((Ok(Token::Gt), _)) => CompareOp::Greater,
            Some((Ok(Token::Gte), _)) => CompareOp::GreaterOrEqual,
            Some((_, span)) => return Err(self.unexpected(span, "comparison operator")),
            None => {
                return Err(ExpressionError::UnexpectedEnd {
                    expected: "comparison operator".to_string(),
                })
            }
        };
        self.advance();
        Ok(op)
    }

    /// Everything up to the next `&&`/`||`, taken from the source text so
    /// characters the lexer rejects are still valid inside values.
    fn parse_literal(&mut self) -> String {
        let start = match self.peek() {
            Some((_, span)) => span.start,
            None => return String::new(),
        };
        let mut end = start;
        while let Some((token, span)) = self.peek() {
            if matches!(token, Ok(Token::And) | Ok(Token::Or)) {
                break;
            }
            end = span.end;
            self.advance();
        }

        let raw = self.source[start..end].trim();
        match raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            Some(unquoted) => unquoted.to_string(),
            None => raw.to_string(),
        }
    }

    fn peek(&self) -> Option<&(Result<Token, ()>, Range<usize>)> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn check(&self, token: Token) -> bool {
        matches!(self.peek(), Some((Ok(t), _)) if *t == token)
    }

    fn unexpected(&self, span: Range<usize>, expected: &str) -> ExpressionError {
        ExpressionError::UnexpectedToken {
            pos: span.start,
            expected: expected.to_string(),
            found: self.source[span].to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> PathSegment {
        PathSegment::Name(s.to_string())
    }

    #[test]
    fn test_parse_single_statement() {
        let expr = Expression::parse("Level>5").unwrap();
        assert_eq!(expr.groups.len(), 1);
        let statement = &expr.groups[0][0];
        assert_eq!(statement.path, vec![name("Level")]);
        assert_eq!(statement.op, CompareOp::Greater);
        assert_eq!(statement.literal, "5");
    }

    #[test]
    fn test_or_of_ands() {
        let expr = Expression::parse("A==1 && B!=2 || C<=3").unwrap();
        assert_eq!(expr.groups.len(), 2);
        assert_eq!(expr.groups[0].len(), 2);
        assert_eq!(expr.groups[1].len(), 1);
        assert_eq!(expr.groups[0][1].op, CompareOp::NotEqual);
        assert_eq!(expr.groups[1][0].op, CompareOp::LessOrEqual);
    }

    #[test]
    fn test_paths_with_root_and_parent() {
        let expr = Expression::parse("Root.Settings.Mode == Fast && Parent.Kind == Boss").unwrap();
        let first = &expr.groups[0][0];
        assert_eq!(first.path, vec![PathSegment::Root, name("Settings"), name("Mode")]);
        assert_eq!(first.literal, "Fast");
        assert_eq!(expr.groups[0][1].path, vec![PathSegment::Parent, name("Kind")]);
    }

    #[test]
    fn test_literal_is_raw_text() {
        let expr = Expression::parse("Element==Fire, Ice").unwrap();
        let statement = &expr.groups[0][0];
        assert_eq!(statement.literal, "Fire, Ice");
        assert_eq!(statement.literal_values().collect::<Vec<_>>(), vec!["Fire", "Ice"]);
        assert!(statement.literal_matches("Ice"));
        assert!(statement.literal_matches("Fire, Ice"));
        assert!(!statement.literal_matches("Fire,Ice"));

        let expr = Expression::parse("Path==C:/textures/grass.png").unwrap();
        assert_eq!(expr.groups[0][0].literal, "C:/textures/grass.png");

        let expr = Expression::parse(r#"Label=="Hello && bye""#).unwrap();
        assert_eq!(expr.groups.len(), 1);
    }

    #[test]
    fn test_null_and_empty_literals() {
        let expr = Expression::parse("Target!=null || Other==").unwrap();
        assert!(expr.groups[0][0].literal_is_null());
        assert!(expr.groups[1][0].literal_is_null());
    }

    #[test]
    fn test_negative_and_decimal_numbers() {
        let expr = Expression::parse("Scale>=-0.5").unwrap();
        assert_eq!(expr.groups[0][0].literal, "-0.5");
        assert_eq!(expr.groups[0][0].op, CompareOp::GreaterOrEqual);
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(Expression::parse("  "), Err(ExpressionError::Empty));
        assert!(matches!(
            Expression::parse("Level=5"),
            Err(ExpressionError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            Expression::parse("Level"),
            Err(ExpressionError::UnexpectedEnd { .. })
        ));
        assert!(matches!(
            Expression::parse("==5"),
            Err(ExpressionError::UnexpectedToken { .. })
        ));
        assert!(Expression::parse("A==1 &&").is_err());
    }

    #[test]
    fn test_compare_op_helpers() {
        assert!(CompareOp::Greater.compare_numbers(6.0, 5.0));
        assert!(!CompareOp::Greater.compare_numbers(5.0, 5.0));
        assert!(CompareOp::NotEqual.apply_equality(false));
        assert!(CompareOp::Less.is_ordering());
        assert!(!CompareOp::Equal.is_ordering());
    }
}
