use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Person category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonCategory {
    Staff,
    Student,
    ParentGuardian,
}

impl PersonCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staff => "staff",
            Self::Student => "student",
            Self::ParentGuardian => "parent_guardian",
        }
    }

    /// Whether people of this category may be referenced as a student's guardian
    pub fn is_guardian_capable(&self) -> bool {
        !matches!(self, Self::Student)
    }
}

/// Error for an unrecognized category value coming back from the database
#[derive(Debug, thiserror::Error)]
#[error("unknown person category `{0}`")]
pub struct UnknownCategory(pub String);

impl std::str::FromStr for PersonCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staff" => Ok(Self::Staff),
            "student" => Ok(Self::Student),
            "parent_guardian" => Ok(Self::ParentGuardian),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// Category-specific fields of a person record
///
/// Modeled as an enum so a staff record cannot carry guardian links and a
/// student cannot carry a staff role. The wire shape stays flat: `category`
/// is the tag and the variant fields sit next to the common ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum PersonDetails {
    Staff {
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<String>,
    },
    Student {
        #[serde(rename = "class", skip_serializing_if = "Option::is_none")]
        class_label: Option<String>,
        guardian_ids: Vec<i64>,
    },
    ParentGuardian {
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<String>,
    },
}

impl PersonDetails {
    pub fn category(&self) -> PersonCategory {
        match self {
            Self::Staff { .. } => PersonCategory::Staff,
            Self::Student { .. } => PersonCategory::Student,
            Self::ParentGuardian { .. } => PersonCategory::ParentGuardian,
        }
    }

    pub fn role(&self) -> Option<&str> {
        match self {
            Self::Staff { role } | Self::ParentGuardian { role } => role.as_deref(),
            Self::Student { .. } => None,
        }
    }

    pub fn class_label(&self) -> Option<&str> {
        match self {
            Self::Student { class_label, .. } => class_label.as_deref(),
            _ => None,
        }
    }

    pub fn guardian_ids(&self) -> &[i64] {
        match self {
            Self::Student { guardian_ids, .. } => guardian_ids,
            _ => &[],
        }
    }
}

/// Persisted person record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(flatten)]
    pub details: PersonDetails,
    pub bio: String,
    pub external_roster_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Person {
    pub fn guardian_ids(&self) -> &[i64] {
        self.details.guardian_ids()
    }
}

/// A fully enriched record, ready for insertion
///
/// Produced by the batch importer once bios and roster ids have been
/// obtained; for students, `guardian_ids` inside the details are already
/// resolved to real database ids.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPerson {
    pub first_name: String,
    pub last_name: String,
    pub image: Option<String>,
    pub details: PersonDetails,
    pub bio: String,
    pub external_roster_id: String,
}

impl NewPerson {
    pub fn category(&self) -> PersonCategory {
        self.details.category()
    }
}

/// One record of a batch import request
#[derive(Debug, Clone, Deserialize)]
pub struct Submission {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(flatten)]
    pub details: SubmissionDetails,
}

/// Category-specific fields of a submission
///
/// Guardian-capable submissions may carry a `temp_id` so that student
/// submissions in the same batch can reference them before they have a
/// database id. Students reference guardians two ways: `guardian_ids` for
/// people that already exist, `guardian_temp_ids` for guardians created in
/// the same batch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum SubmissionDetails {
    Staff {
        #[serde(default)]
        temp_id: Option<String>,
        #[serde(default)]
        role: Option<String>,
    },
    Student {
        #[serde(default, rename = "class")]
        class_label: Option<String>,
        #[serde(default)]
        guardian_ids: Vec<i64>,
        #[serde(default)]
        guardian_temp_ids: Vec<String>,
    },
    ParentGuardian {
        #[serde(default)]
        temp_id: Option<String>,
        #[serde(default)]
        role: Option<String>,
    },
}

impl Submission {
    pub fn temp_id(&self) -> Option<&str> {
        match &self.details {
            SubmissionDetails::Staff { temp_id, .. }
            | SubmissionDetails::ParentGuardian { temp_id, .. } => temp_id.as_deref(),
            SubmissionDetails::Student { .. } => None,
        }
    }
}

/// Request DTO for the batch import endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ImportBatchRequest {
    pub people: Vec<Submission>,
}

/// Request DTO for partial person updates
///
/// Category is immutable; applying a field to the wrong category is rejected
/// by the handler. Absent fields are left unchanged.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePersonRequest {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, rename = "class")]
    pub class_label: Option<String>,
    #[serde(default)]
    pub guardian_ids: Option<Vec<i64>>,
}

/// Validates a batch before any enrichment or persistence happens
///
/// Rules: the batch is non-empty, names are non-blank, temp ids are non-blank
/// and unique within the batch, and every student carries at least one
/// guardian reference. Returns a message suitable for a 400 response.
pub fn validate_batch(submissions: &[Submission]) -> Result<(), String> {
    if submissions.is_empty() {
        return Err("batch must contain at least one submission".to_string());
    }

    let mut seen_temp_ids: HashSet<&str> = HashSet::new();
    for (idx, sub) in submissions.iter().enumerate() {
        if sub.first_name.trim().is_empty() {
            return Err(format!("submission {idx}: first_name must not be blank"));
        }
        if sub.last_name.trim().is_empty() {
            return Err(format!("submission {idx}: last_name must not be blank"));
        }

        if let Some(temp_id) = sub.temp_id() {
            if temp_id.trim().is_empty() {
                return Err(format!("submission {idx}: temp_id must not be blank"));
            }
            if !seen_temp_ids.insert(temp_id) {
                return Err(format!("submission {idx}: duplicate temp_id `{temp_id}`"));
            }
        }

        if let SubmissionDetails::Student {
            guardian_ids,
            guardian_temp_ids,
            ..
        } = &sub.details
        {
            if guardian_ids.is_empty() && guardian_temp_ids.is_empty() {
                return Err(format!(
                    "submission {idx}: a student needs at least one guardian reference"
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent(temp_id: &str, first: &str, last: &str) -> Submission {
        Submission {
            first_name: first.to_string(),
            last_name: last.to_string(),
            image: None,
            details: SubmissionDetails::ParentGuardian {
                temp_id: Some(temp_id.to_string()),
                role: None,
            },
        }
    }

    fn student(first: &str, last: &str, guardian_temp_ids: &[&str]) -> Submission {
        Submission {
            first_name: first.to_string(),
            last_name: last.to_string(),
            image: None,
            details: SubmissionDetails::Student {
                class_label: None,
                guardian_ids: vec![],
                guardian_temp_ids: guardian_temp_ids.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    #[test]
    fn submission_json_is_flat() {
        let sub: Submission = serde_json::from_value(serde_json::json!({
            "category": "student",
            "first_name": "Leo",
            "last_name": "Cole",
            "class": "Grade 5",
            "guardian_temp_ids": ["a", "b"]
        }))
        .unwrap();

        assert_eq!(sub.temp_id(), None);
        match sub.details {
            SubmissionDetails::Student {
                class_label,
                guardian_ids,
                guardian_temp_ids,
            } => {
                assert_eq!(class_label.as_deref(), Some("Grade 5"));
                assert!(guardian_ids.is_empty());
                assert_eq!(guardian_temp_ids, vec!["a", "b"]);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn person_serializes_with_category_tag() {
        let person = Person {
            id: 7,
            first_name: "Dana".to_string(),
            last_name: "Reyes".to_string(),
            image: None,
            details: PersonDetails::Staff {
                role: Some("Teacher".to_string()),
            },
            bio: "A valued member of our community.".to_string(),
            external_roster_id: "TMP-12345".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let value = serde_json::to_value(&person).unwrap();
        assert_eq!(value["category"], "staff");
        assert_eq!(value["role"], "Teacher");
        assert!(value.get("guardian_ids").is_none());
        assert!(value.get("image").is_none());
    }

    #[test]
    fn student_serializes_class_field() {
        let person = Person {
            id: 8,
            first_name: "Leo".to_string(),
            last_name: "Cole".to_string(),
            image: None,
            details: PersonDetails::Student {
                class_label: Some("Grade 5".to_string()),
                guardian_ids: vec![1, 2],
            },
            bio: "bio".to_string(),
            external_roster_id: "R-1".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let value = serde_json::to_value(&person).unwrap();
        assert_eq!(value["category"], "student");
        assert_eq!(value["class"], "Grade 5");
        assert_eq!(value["guardian_ids"], serde_json::json!([1, 2]));
        assert!(value.get("role").is_none());
    }

    #[test]
    fn validate_batch_rejects_bad_input() {
        assert!(validate_batch(&[]).is_err());

        let blank = Submission {
            first_name: "  ".to_string(),
            ..parent("a", "Marcus", "Cole")
        };
        assert!(validate_batch(&[blank]).is_err());

        let dup = vec![parent("a", "Marcus", "Cole"), parent("a", "Olivia", "Chen")];
        let err = validate_batch(&dup).unwrap_err();
        assert!(err.contains("duplicate temp_id"), "got: {err}");

        let orphan = student("Leo", "Cole", &[]);
        let err = validate_batch(&[orphan]).unwrap_err();
        assert!(err.contains("guardian reference"), "got: {err}");
    }

    #[test]
    fn validate_batch_accepts_mixed_batch() {
        let batch = vec![
            parent("a", "Marcus", "Cole"),
            parent("b", "Olivia", "Chen"),
            student("Leo", "Cole", &["a", "b"]),
        ];
        assert!(validate_batch(&batch).is_ok());
    }
}
