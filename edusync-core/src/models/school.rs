use serde::{Deserialize, Serialize};
use std::fmt;

use super::coerce;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct School {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "coerce::text")]
    pub address: String,
    #[serde(default)]
    pub logo_url: Option<String>,
}

impl School {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: super::new_id(),
            name: name.into(),
            address: address.into(),
            logo_url: None,
        }
    }

    pub fn with_logo_url(mut self, logo_url: impl Into<String>) -> Self {
        self.logo_url = Some(logo_url.into());
        self
    }
}

impl fmt::Display for School {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.address.is_empty() {
            write!(f, " ({})", self.address)?;
        }
        Ok(())
    }
}
