// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Question kind: auto-scored multiple choice or free-form code.
/// Code answers are stored verbatim and never auto-scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum QuestionKind {
    Mcq,
    Code,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::Mcq => "mcq",
            QuestionKind::Code => "code",
        }
    }

    /// Parses a wire value. Returns `None` for anything outside the
    /// closed set so callers can reject the whole batch.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mcq" => Some(QuestionKind::Mcq),
            "code" => Some(QuestionKind::Code),
            _ => None,
        }
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub kind: QuestionKind,
    pub option_a: Option<String>,
    pub option_b: Option<String>,
    pub option_c: Option<String>,
    pub option_d: Option<String>,
    /// Correct option letter ('A'..'D'), mcq only.
    pub correct_answer: Option<String>,
    /// Starter template, code only.
    pub coding_template: Option<String>,
    pub difficulty: String,
    pub category: String,
    pub created_at: Option<chrono::NaiveDateTime>,
}

/// DTO for sending a question to exam takers (excludes the answer key).
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: i64,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub option_a: Option<String>,
    pub option_b: Option<String>,
    pub option_c: Option<String>,
    pub option_d: Option<String>,
    pub coding_template: Option<String>,
    pub difficulty: String,
    pub category: String,
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub option_a: Option<String>,
    pub option_b: Option<String>,
    pub option_c: Option<String>,
    pub option_d: Option<String>,
    pub correct_answer: Option<String>,
    pub coding_template: Option<String>,
    pub difficulty: Option<String>,
    pub category: Option<String>,
}

impl CreateQuestionRequest {
    /// Kind-specific requirements that `validator` derives can't express:
    /// mcq needs all four options plus a correct letter, code needs a template.
    pub fn validate_kind_fields(&self) -> Result<(), String> {
        match self.kind {
            QuestionKind::Mcq => {
                let options = [
                    &self.option_a,
                    &self.option_b,
                    &self.option_c,
                    &self.option_d,
                ];
                if options.iter().any(|o| o.as_deref().is_none_or(str::is_empty)) {
                    return Err("MCQ options and correct answer are required".to_string());
                }
                match self.correct_answer.as_deref() {
                    Some("A") | Some("B") | Some("C") | Some("D") => Ok(()),
                    _ => Err("MCQ options and correct answer are required".to_string()),
                }
            }
            QuestionKind::Code => {
                if self.coding_template.as_deref().is_none_or(str::is_empty) {
                    return Err("Coding template is required for code questions".to_string());
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mcq_request() -> CreateQuestionRequest {
        CreateQuestionRequest {
            text: "What is 2 + 2?".to_string(),
            kind: QuestionKind::Mcq,
            option_a: Some("3".to_string()),
            option_b: Some("4".to_string()),
            option_c: Some("5".to_string()),
            option_d: Some("6".to_string()),
            correct_answer: Some("B".to_string()),
            coding_template: None,
            difficulty: None,
            category: None,
        }
    }

    #[test]
    fn mcq_requires_all_options() {
        let mut req = mcq_request();
        assert!(req.validate_kind_fields().is_ok());

        req.option_c = None;
        assert!(req.validate_kind_fields().is_err());
    }

    #[test]
    fn mcq_requires_valid_correct_letter() {
        let mut req = mcq_request();
        req.correct_answer = Some("E".to_string());
        assert!(req.validate_kind_fields().is_err());
    }

    #[test]
    fn code_requires_template() {
        let req = CreateQuestionRequest {
            text: "Reverse a string".to_string(),
            kind: QuestionKind::Code,
            option_a: None,
            option_b: None,
            option_c: None,
            option_d: None,
            correct_answer: None,
            coding_template: Some("fn reverse(s: &str) -> String {}".to_string()),
            difficulty: None,
            category: None,
        };
        assert!(req.validate_kind_fields().is_ok());
    }

    #[test]
    fn kind_parse_rejects_unknown() {
        assert_eq!(QuestionKind::parse("mcq"), Some(QuestionKind::Mcq));
        assert_eq!(QuestionKind::parse("code"), Some(QuestionKind::Code));
        assert_eq!(QuestionKind::parse("essay"), None);
    }
}
