use thiserror::Error;

pub type MarkupResult<T> = Result<T, MarkupError>;

#[derive(Error, Debug)]
pub enum MarkupError {
    #[error("Malformed markup at byte {pos}: {source}")]
    Xml {
        pos: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("Invalid UTF-8 in markup: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Unexpected closing tag </{found}> at byte {pos}")]
    UnbalancedClose { pos: u64, found: String },

    #[error("Unclosed element <{name}> at end of input")]
    Unclosed { name: String },

    #[error("Markup contains more than one root element (second is <{name}>)")]
    MultipleRoots { name: String },

    #[error("Markup contains no root element")]
    MissingRoot,
}

impl MarkupError {
    pub fn xml(pos: u64, source: impl Into<quick_xml::Error>) -> Self {
        Self::Xml {
            pos,
            source: source.into(),
        }
    }
}
