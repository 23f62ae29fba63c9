use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::coerce;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default, deserialize_with = "coerce::int")]
    pub sort_order: i64,
    #[serde(default)]
    pub teacher_id: Option<String>,
    pub school_id: String,
}

impl Class {
    pub fn new(name: impl Into<String>, school_id: impl Into<String>) -> Self {
        Self {
            id: super::new_id(),
            name: name.into(),
            section: None,
            sort_order: 0,
            teacher_id: None,
            school_id: school_id.into(),
        }
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_sort_order(mut self, sort_order: i64) -> Self {
        self.sort_order = sort_order;
        self
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.section {
            Some(section) if !section.is_empty() => write!(f, "{} - {}", self.name, section),
            _ => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub school_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: String,
    pub name: String,
    pub school_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Leave,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
            AttendanceStatus::Leave => "Leave",
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "present" | "p" => Ok(AttendanceStatus::Present),
            "absent" | "a" => Ok(AttendanceStatus::Absent),
            "leave" | "l" => Ok(AttendanceStatus::Leave),
            _ => Err(format!(
                "Invalid attendance status: '{}'. Valid options: present, absent, leave",
                s
            )),
        }
    }
}

/// One attendance mark; unique per (student, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub id: String,
    pub student_id: String,
    #[serde(deserialize_with = "coerce::required_date")]
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

/// Marks for one subject of one exam; unique per (student, class, exam, subject).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    pub id: String,
    pub student_id: String,
    #[serde(default, deserialize_with = "coerce::text")]
    pub class_id: String,
    pub exam: String,
    pub subject: String,
    #[serde(default, deserialize_with = "coerce::money")]
    pub marks: f64,
    #[serde(default, deserialize_with = "coerce::money")]
    pub total_marks: f64,
}

impl ExamResult {
    /// Percentage of total marks, or `None` when no total is recorded.
    pub fn percentage(&self) -> Option<f64> {
        (self.total_marks > 0.0).then(|| self.marks / self.total_marks * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_class_sort_order_from_string() {
        let class: Class = serde_json::from_value(json!({
            "id": "c1", "name": "Grade 5", "section": "A", "sortOrder": "3", "schoolId": "s1"
        }))
        .unwrap();
        assert_eq!(class.sort_order, 3);
        assert_eq!(class.to_string(), "Grade 5 - A");
    }

    #[test]
    fn test_attendance_requires_a_date() {
        let bad = serde_json::from_value::<Attendance>(json!({
            "id": "a1", "studentId": "s1", "date": "soon", "status": "Present"
        }));
        assert!(bad.is_err());

        let ok: Attendance = serde_json::from_value(json!({
            "id": "a1", "studentId": "s1", "date": "2024-03-04T00:00:00.000Z", "status": "Absent"
        }))
        .unwrap();
        assert_eq!(ok.date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
    }

    #[test]
    fn test_result_marks_are_numeric() {
        let result: ExamResult = serde_json::from_value(json!({
            "id": "r1", "studentId": "s1", "classId": "c1", "exam": "Mid", "subject": "Math",
            "marks": "45.5", "totalMarks": "50"
        }))
        .unwrap();
        assert_eq!(result.marks, 45.5);
        assert_eq!(result.percentage(), Some(91.0));
    }

    #[test]
    fn test_attendance_status_from_str() {
        assert_eq!("P".parse::<AttendanceStatus>().unwrap(), AttendanceStatus::Present);
        assert!("late".parse::<AttendanceStatus>().is_err());
    }
}
