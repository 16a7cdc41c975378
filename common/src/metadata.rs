use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label of the call-to-action button attached to every minted item.
pub const ARTIST_BUTTON_LABEL: &str = "Become an Artist 🎨";

/// Where the call-to-action button leads.
pub const ARTIST_BUTTON_URI: &str = "https://t.me/NFTDrawBot/Draw";

/// A form field was left empty or is too long.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),
    #[error("{field} must be at most {max} bytes")]
    TooLong { field: &'static str, max: usize },
}

/// The user-supplied part of a mint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintForm {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl MintForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Required("name"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub trait_type: String,
    pub value: String,
}

/// Item metadata document stored next to the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub buttons: Vec<Button>,
    pub attributes: Vec<Attribute>,
}

impl Metadata {
    /// Metadata for a drawing uploaded at `image_url`, with the standard
    /// button and attributes.
    pub fn for_drawing(form: &MintForm, image_url: impl Into<String>) -> Result<Self, ValidationError> {
        form.validate()?;
        Ok(Self {
            name: form.name.trim().to_string(),
            image: image_url.into(),
            description: form
                .description
                .as_ref()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            buttons: vec![Button {
                label: ARTIST_BUTTON_LABEL.to_string(),
                uri: ARTIST_BUTTON_URI.to_string(),
            }],
            attributes: vec![
                Attribute {
                    trait_type: "Art".to_string(),
                    value: "True".to_string(),
                },
                Attribute {
                    trait_type: "🎨".to_string(),
                    value: "🖌️".to_string(),
                },
            ],
        })
    }
}
