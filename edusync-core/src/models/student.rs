use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::coerce;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StudentStatus {
    #[default]
    Active,
    Left,
    Graduated,
    /// Soft delete; the row stays for historical fees and results.
    Deleted,
}

impl StudentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentStatus::Active => "Active",
            StudentStatus::Left => "Left",
            StudentStatus::Graduated => "Graduated",
            StudentStatus::Deleted => "Deleted",
        }
    }
}

impl fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-student override of a fee head's default amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeStructureItem {
    pub fee_head_id: String,
    #[serde(deserialize_with = "coerce::money")]
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "coerce::text")]
    pub roll_number: String,
    /// Empty when the class was deleted.
    #[serde(default, deserialize_with = "coerce::text")]
    pub class_id: String,
    #[serde(default, deserialize_with = "coerce::text")]
    pub school_id: String,
    #[serde(default, deserialize_with = "coerce::text")]
    pub father_name: String,
    #[serde(default)]
    pub father_cnic: Option<String>,
    #[serde(default, deserialize_with = "coerce::date")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default, deserialize_with = "coerce::date")]
    pub date_of_admission: Option<NaiveDate>,
    #[serde(default)]
    pub contact_number: Option<String>,
    #[serde(default)]
    pub secondary_contact_number: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "coerce::lenient")]
    pub status: StudentStatus,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub admitted_class: Option<String>,
    #[serde(default)]
    pub gr_number: Option<String>,
    #[serde(default)]
    pub religion: Option<String>,
    #[serde(default)]
    pub caste: Option<String>,
    #[serde(default)]
    pub last_school_attended: Option<String>,
    #[serde(default, deserialize_with = "coerce::money")]
    pub opening_balance: f64,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "coerce::json_list")]
    pub fee_structure: Vec<FeeStructureItem>,
    #[serde(default, deserialize_with = "coerce::date")]
    pub date_of_leaving: Option<NaiveDate>,
    #[serde(default)]
    pub reason_for_leaving: Option<String>,
    #[serde(default)]
    pub conduct: Option<String>,
    #[serde(default)]
    pub progress: Option<String>,
    #[serde(default)]
    pub place_of_birth: Option<String>,
}

impl Student {
    pub fn new(
        name: impl Into<String>,
        roll_number: impl Into<String>,
        class_id: impl Into<String>,
        school_id: impl Into<String>,
    ) -> Self {
        Self {
            id: super::new_id(),
            name: name.into(),
            roll_number: roll_number.into(),
            class_id: class_id.into(),
            school_id: school_id.into(),
            father_name: String::new(),
            father_cnic: None,
            date_of_birth: None,
            date_of_admission: None,
            contact_number: None,
            secondary_contact_number: None,
            address: None,
            status: StudentStatus::Active,
            gender: None,
            admitted_class: None,
            gr_number: None,
            religion: None,
            caste: None,
            last_school_attended: None,
            opening_balance: 0.0,
            user_id: None,
            fee_structure: Vec::new(),
            date_of_leaving: None,
            reason_for_leaving: None,
            conduct: None,
            progress: None,
            place_of_birth: None,
        }
    }

    pub fn with_father_name(mut self, father_name: impl Into<String>) -> Self {
        self.father_name = father_name.into();
        self
    }

    pub fn with_opening_balance(mut self, opening_balance: f64) -> Self {
        self.opening_balance = opening_balance;
        self
    }

    pub fn with_fee_override(mut self, fee_head_id: impl Into<String>, amount: f64) -> Self {
        self.set_fee_override(fee_head_id, amount);
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == StudentStatus::Active
    }

    /// Amount this student pays for a fee head, if overridden.
    pub fn fee_override(&self, fee_head_id: &str) -> Option<f64> {
        self.fee_structure
            .iter()
            .find(|item| item.fee_head_id == fee_head_id)
            .map(|item| item.amount)
    }

    pub fn set_fee_override(&mut self, fee_head_id: impl Into<String>, amount: f64) {
        let fee_head_id = fee_head_id.into();
        match self
            .fee_structure
            .iter_mut()
            .find(|item| item.fee_head_id == fee_head_id)
        {
            Some(item) => item.amount = amount,
            None => self.fee_structure.push(FeeStructureItem {
                fee_head_id,
                amount,
            }),
        }
    }
}

impl fmt::Display for Student {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.roll_number, self.name)?;
        if !self.father_name.is_empty() {
            write!(f, " s/o {}", self.father_name)?;
        }
        if !self.is_active() {
            write!(f, " [{}]", self.status)?;
        }
        Ok(())
    }
}
