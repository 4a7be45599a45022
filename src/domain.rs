use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Chemical Abstracts Service Registry Number, the row key for most sheets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Casrn(String);

impl Casrn {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Casrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Casrn {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let parts = normalized.split('-').collect::<Vec<_>>();
        let is_valid = parts.len() == 3
            && (2..=7).contains(&parts[0].len())
            && parts[1].len() == 2
            && parts[2].len() == 1
            && parts
                .iter()
                .all(|part| part.chars().all(|ch| ch.is_ascii_digit()));
        if !is_valid {
            return Err(PipelineError::InvalidCasrn(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChemSpiderLink(String);

impl ChemSpiderLink {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChemSpiderLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChemSpiderLink {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let rest = normalized
            .strip_prefix("https://")
            .or_else(|| normalized.strip_prefix("http://"));
        let is_valid = rest.map(|rest| !rest.is_empty()).unwrap_or(false)
            && !normalized.chars().any(|ch| ch.is_whitespace());
        if !is_valid {
            return Err(PipelineError::InvalidLink(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Smiles(String);

impl Smiles {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The source sheets carry stray hyphens in SMILES cells; strip them
    /// before parsing, as single bonds are implicit anyway.
    pub fn sanitized(value: &str) -> Result<Self, PipelineError> {
        value.replace('-', "").parse()
    }
}

impl fmt::Display for Smiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Smiles {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid = !normalized.is_empty()
            && normalized.chars().all(|ch| ch.is_ascii_graphic());
        if !is_valid {
            return Err(PipelineError::InvalidSmiles(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Which identifier a pipeline keys its rows on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Casrn,
    Link,
    Smiles,
}

impl KeyKind {
    pub fn validate(&self, raw: &str) -> Result<(), PipelineError> {
        match self {
            KeyKind::Casrn => raw.parse::<Casrn>().map(|_| ()),
            KeyKind::Link => raw.parse::<ChemSpiderLink>().map(|_| ()),
            KeyKind::Smiles => raw.parse::<Smiles>().map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_casrn_valid() {
        let casrn: Casrn = " 335-67-1 ".parse().unwrap();
        assert_eq!(casrn.as_str(), "335-67-1");
    }

    #[test]
    fn parse_casrn_invalid() {
        let err = "335671".parse::<Casrn>().unwrap_err();
        assert_matches!(err, PipelineError::InvalidCasrn(_));
        let err = "abc-67-1".parse::<Casrn>().unwrap_err();
        assert_matches!(err, PipelineError::InvalidCasrn(_));
    }

    #[test]
    fn parse_link_valid() {
        let link: ChemSpiderLink = "https://www.chemspider.com/Chemical-Structure.9554.html"
            .parse()
            .unwrap();
        assert!(link.as_str().starts_with("https://"));
    }

    #[test]
    fn parse_link_invalid() {
        let err = "chemspider.com/9554".parse::<ChemSpiderLink>().unwrap_err();
        assert_matches!(err, PipelineError::InvalidLink(_));
        let err = "https://".parse::<ChemSpiderLink>().unwrap_err();
        assert_matches!(err, PipelineError::InvalidLink(_));
    }

    #[test]
    fn parse_smiles_valid() {
        let smiles: Smiles = "C(F)(F)(F)C(=O)O".parse().unwrap();
        assert_eq!(smiles.as_str(), "C(F)(F)(F)C(=O)O");
    }

    #[test]
    fn sanitized_strips_hyphens() {
        let smiles = Smiles::sanitized("C-C-O").unwrap();
        assert_eq!(smiles.as_str(), "CCO");
    }

    #[test]
    fn parse_smiles_invalid() {
        let err = "".parse::<Smiles>().unwrap_err();
        assert_matches!(err, PipelineError::InvalidSmiles(_));
        let err = "C C".parse::<Smiles>().unwrap_err();
        assert_matches!(err, PipelineError::InvalidSmiles(_));
    }

    #[test]
    fn key_kind_routing() {
        assert!(KeyKind::Casrn.validate("335-67-1").is_ok());
        assert!(KeyKind::Casrn.validate("not a cas").is_err());
        assert!(KeyKind::Link.validate("http://example.org/page").is_ok());
        assert!(KeyKind::Link.validate("ftp://example.org").is_err());
    }
}
