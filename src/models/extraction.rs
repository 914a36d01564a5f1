use serde::{Deserialize, Serialize};

use super::enums::DocumentType;

/// One recognized identity document.
///
/// Dates are kept as the provider printed them; they are parsed only
/// when a guest record is built from the extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub document_type: DocumentType,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub id_number: Option<String>,
    pub document_number: Option<String>,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    pub nationality: Option<String>,
    pub birth_place: Option<String>,
    pub issue_date: Option<String>,
    pub expiry_date: Option<String>,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub is_valid: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ExtractionRecord {
    /// Empty record of the given type. Useful as a builder base.
    pub fn empty(document_type: DocumentType) -> Self {
        Self {
            document_type,
            given_name: None,
            family_name: None,
            id_number: None,
            document_number: None,
            birth_date: None,
            gender: None,
            nationality: None,
            birth_place: None,
            issue_date: None,
            expiry_date: None,
            father_name: None,
            mother_name: None,
            is_valid: true,
            warnings: Vec::new(),
        }
    }

    pub fn get(&self, field: ExtractionField) -> Option<&str> {
        match field {
            ExtractionField::GivenName => self.given_name.as_deref(),
            ExtractionField::FamilyName => self.family_name.as_deref(),
            ExtractionField::IdNumber => self.id_number.as_deref(),
            ExtractionField::DocumentNumber => self.document_number.as_deref(),
            ExtractionField::BirthDate => self.birth_date.as_deref(),
            ExtractionField::Gender => self.gender.as_deref(),
            ExtractionField::Nationality => self.nationality.as_deref(),
            ExtractionField::BirthPlace => self.birth_place.as_deref(),
            ExtractionField::IssueDate => self.issue_date.as_deref(),
            ExtractionField::ExpiryDate => self.expiry_date.as_deref(),
            ExtractionField::FatherName => self.father_name.as_deref(),
            ExtractionField::MotherName => self.mother_name.as_deref(),
        }
    }

    /// Set a field. Blank values clear it.
    pub fn set(&mut self, field: ExtractionField, value: Option<String>) {
        let value = value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let slot = match field {
            ExtractionField::GivenName => &mut self.given_name,
            ExtractionField::FamilyName => &mut self.family_name,
            ExtractionField::IdNumber => &mut self.id_number,
            ExtractionField::DocumentNumber => &mut self.document_number,
            ExtractionField::BirthDate => &mut self.birth_date,
            ExtractionField::Gender => &mut self.gender,
            ExtractionField::Nationality => &mut self.nationality,
            ExtractionField::BirthPlace => &mut self.birth_place,
            ExtractionField::IssueDate => &mut self.issue_date,
            ExtractionField::ExpiryDate => &mut self.expiry_date,
            ExtractionField::FatherName => &mut self.father_name,
            ExtractionField::MotherName => &mut self.mother_name,
        };
        *slot = value;
    }

    /// Fields whose value differs from `other`, in declaration order.
    pub fn diff(&self, edited: &ExtractionRecord) -> Vec<FieldChange> {
        ExtractionField::ALL
            .iter()
            .filter_map(|&field| {
                let before = self.get(field);
                let after = edited.get(field);
                (before != after).then(|| FieldChange {
                    field,
                    before: before.map(str::to_string),
                    after: after.map(str::to_string),
                })
            })
            .collect()
    }

    /// "Family, Given" for list display; falls back to whatever is present.
    pub fn display_name(&self) -> String {
        match (self.family_name.as_deref(), self.given_name.as_deref()) {
            (Some(family), Some(given)) => format!("{family}, {given}"),
            (Some(only), None) | (None, Some(only)) => only.to_string(),
            (None, None) => "(unnamed)".to_string(),
        }
    }
}

/// Editable identity fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionField {
    GivenName,
    FamilyName,
    IdNumber,
    DocumentNumber,
    BirthDate,
    Gender,
    Nationality,
    BirthPlace,
    IssueDate,
    ExpiryDate,
    FatherName,
    MotherName,
}

impl ExtractionField {
    pub const ALL: [ExtractionField; 12] = [
        Self::GivenName,
        Self::FamilyName,
        Self::IdNumber,
        Self::DocumentNumber,
        Self::BirthDate,
        Self::Gender,
        Self::Nationality,
        Self::BirthPlace,
        Self::IssueDate,
        Self::ExpiryDate,
        Self::FatherName,
        Self::MotherName,
    ];
}

/// One edited field, kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: ExtractionField,
    pub before: Option<String>,
    pub after: Option<String>,
}
