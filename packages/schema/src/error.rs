use crate::expression::ExpressionError;
use thiserror::Error;

pub type SchemaResult<T> = Result<T, SchemaError>;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Markup error in schema source '{source_name}': {error}")]
    Markup {
        source_name: String,
        #[source]
        error: structdoc_markup::MarkupError,
    },

    #[error("Unknown definition type '{tag}'")]
    UnknownKind { tag: String },

    #[error("Definition <{tag}> is missing required attribute '{attribute}'")]
    MissingAttribute { tag: String, attribute: String },

    #[error("Invalid value '{value}' for attribute '{attribute}' on '{definition}'")]
    InvalidAttribute {
        definition: String,
        attribute: String,
        value: String,
    },

    #[error("Definition '{owner}' references unknown key '{key}'")]
    UnresolvedReference { owner: String, key: String },

    #[error("Invalid VisibleIf on '{owner}': {error}")]
    InvalidExpression {
        owner: String,
        #[source]
        error: ExpressionError,
    },

    #[error("Schema contains no root definition")]
    NoRootDefinition,

    #[error("Unknown root definition '{name}'")]
    UnknownRoot { name: String },
}

impl SchemaError {
    pub fn missing_attribute(tag: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::MissingAttribute {
            tag: tag.into(),
            attribute: attribute.into(),
        }
    }

    pub fn invalid_attribute(
        definition: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::InvalidAttribute {
            definition: definition.into(),
            attribute: attribute.into(),
            value: value.into(),
        }
    }
}

/// Soft failures collected during resolution. Loading continues past them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaWarning {
    MissingEnumKey { owner: String, key: String },
}

impl std::fmt::Display for SchemaWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaWarning::MissingEnumKey { owner, key } => {
                write!(f, "Enum '{}' references unknown key '{}'", owner, key)
            }
        }
    }
}
