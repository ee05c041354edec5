//! Deterministic administrative form generation
//!
//! Templates are matched by explicit form type or by keywords in the query,
//! pre-filled from decision-supplied fields and the user profile, and
//! rendered as markdown. No model call is involved.

use super::{mismatch, required_query};
use crate::context::{Language, UserContext};
use crate::errors::ToolError;
use crate::executor::{ExecutionContext, ToolHandler};
use crate::locale;
use crate::tools::{FormOutput, ToolArguments, ToolResult, ToolType};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// One field of a form template
#[derive(Debug, Clone)]
pub struct FormField {
    pub key: &'static str,
    pub label_vi: &'static str,
    pub label_en: &'static str,
    /// Profile keys that can supply this field, in priority order
    pub profile_keys: &'static [&'static str],
}

impl FormField {
    pub fn label(&self, language: Language) -> &'static str {
        match language {
            Language::Vi => self.label_vi,
            Language::En => self.label_en,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormTemplate {
    pub form_type: &'static str,
    pub title_vi: &'static str,
    pub title_en: &'static str,
    /// Lowercase keywords, Vietnamese and English
    pub keywords: &'static [&'static str],
    pub fields: &'static [FormField],
}

impl FormTemplate {
    pub fn title(&self, language: Language) -> &'static str {
        match language {
            Language::Vi => self.title_vi,
            Language::En => self.title_en,
        }
    }

    fn keyword_hits(&self, query: &str) -> usize {
        self.keywords.iter().filter(|k| query.contains(*k)).count()
    }
}

const FULL_NAME: FormField = FormField {
    key: "full_name",
    label_vi: "Họ và tên",
    label_en: "Full name",
    profile_keys: &["full_name", "name"],
};

const STUDENT_ID: FormField = FormField {
    key: "student_id",
    label_vi: "Mã sinh viên",
    label_en: "Student ID",
    profile_keys: &["student_id", "mssv"],
};

const CLASS: FormField = FormField {
    key: "class",
    label_vi: "Lớp",
    label_en: "Class",
    profile_keys: &["class", "class_name"],
};

const FACULTY: FormField = FormField {
    key: "faculty",
    label_vi: "Khoa",
    label_en: "Faculty",
    profile_keys: &["faculty", "department"],
};

const DATE_OF_BIRTH: FormField = FormField {
    key: "date_of_birth",
    label_vi: "Ngày sinh",
    label_en: "Date of birth",
    profile_keys: &["date_of_birth", "dob"],
};

const fn request_field(key: &'static str, label_vi: &'static str, label_en: &'static str) -> FormField {
    FormField {
        key,
        label_vi,
        label_en,
        profile_keys: &[],
    }
}

static LEAVE_OF_ABSENCE_FIELDS: [FormField; 8] = [
    FULL_NAME,
    DATE_OF_BIRTH,
    STUDENT_ID,
    CLASS,
    FACULTY,
    request_field("from_date", "Nghỉ từ ngày", "From date"),
    request_field("to_date", "Đến ngày", "To date"),
    request_field("reason", "Lý do", "Reason"),
];

static TRANSCRIPT_FIELDS: [FormField; 7] = [
    FULL_NAME,
    STUDENT_ID,
    CLASS,
    FACULTY,
    request_field("semester", "Học kỳ", "Semester"),
    request_field("copies", "Số bản", "Number of copies"),
    request_field("purpose", "Mục đích", "Purpose"),
];

static CERTIFICATE_FIELDS: [FormField; 6] = [
    FULL_NAME,
    DATE_OF_BIRTH,
    STUDENT_ID,
    CLASS,
    FACULTY,
    request_field("purpose", "Mục đích xác nhận", "Purpose"),
];

/// Known form templates
#[derive(Debug, Clone)]
pub struct FormTemplateRegistry {
    templates: Vec<FormTemplate>,
}

impl FormTemplateRegistry {
    pub fn new(templates: Vec<FormTemplate>) -> Self {
        Self { templates }
    }

    /// Leave of absence, transcript request and student certificate
    pub fn standard() -> Self {
        Self::new(vec![
            FormTemplate {
                form_type: "leave_of_absence",
                title_vi: "ĐƠN XIN NGHỈ HỌC",
                title_en: "LEAVE OF ABSENCE REQUEST",
                keywords: &["nghỉ học", "bảo lưu", "tạm dừng học", "leave of absence", "suspend"],
                fields: &LEAVE_OF_ABSENCE_FIELDS,
            },
            FormTemplate {
                form_type: "transcript_request",
                title_vi: "ĐƠN XIN CẤP BẢNG ĐIỂM",
                title_en: "TRANSCRIPT REQUEST",
                keywords: &["bảng điểm", "kết quả học tập", "transcript", "grade report"],
                fields: &TRANSCRIPT_FIELDS,
            },
            FormTemplate {
                form_type: "student_certificate",
                title_vi: "GIẤY XÁC NHẬN SINH VIÊN",
                title_en: "STUDENT CERTIFICATE",
                keywords: &[
                    "giấy xác nhận",
                    "xác nhận sinh viên",
                    "student certificate",
                    "enrollment certificate",
                    "certificate of enrollment",
                ],
                fields: &CERTIFICATE_FIELDS,
            },
        ])
    }

    pub fn get(&self, form_type: &str) -> Option<&FormTemplate> {
        self.templates.iter().find(|t| t.form_type == form_type)
    }

    /// Best keyword match for a query, if any keyword matches at all
    pub fn match_query(&self, query: &str) -> Option<&FormTemplate> {
        let query = query.to_lowercase();
        self.templates
            .iter()
            .map(|t| (t.keyword_hits(&query), t))
            .filter(|(hits, _)| *hits > 0)
            .max_by_key(|(hits, _)| *hits)
            .map(|(_, t)| t)
    }
}

impl Default for FormTemplateRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

pub struct FormFillHandler {
    registry: FormTemplateRegistry,
}

impl FormFillHandler {
    pub fn new(registry: FormTemplateRegistry) -> Self {
        Self { registry }
    }

    fn prefill(
        template: &FormTemplate,
        known_fields: &BTreeMap<String, String>,
        user: &UserContext,
    ) -> (BTreeMap<String, String>, Vec<String>) {
        let mut filled = BTreeMap::new();
        let mut missing = Vec::new();

        for field in template.fields {
            let value = known_fields
                .get(field.key)
                .or_else(|| field.profile_keys.iter().find_map(|k| user.profile.get(*k)))
                .cloned()
                .or_else(|| (field.key == FULL_NAME.key).then(|| user.display_name.clone()).flatten())
                .filter(|v| !v.trim().is_empty());

            match value {
                Some(value) => {
                    filled.insert(field.key.to_string(), value);
                }
                None => missing.push(field.key.to_string()),
            }
        }

        (filled, missing)
    }

    fn render(
        template: &FormTemplate,
        filled: &BTreeMap<String, String>,
        missing: &[String],
        language: Language,
    ) -> String {
        let mut markdown = format!("# {}\n\n", template.title(language));
        for field in template.fields {
            let value = filled.get(field.key).map(String::as_str).unwrap_or("____________");
            markdown.push_str(&format!("**{}:** {}\n\n", field.label(language), value));
        }

        if !missing.is_empty() {
            let labels: Vec<&str> = template
                .fields
                .iter()
                .filter(|f| missing.iter().any(|m| m.as_str() == f.key))
                .map(|f| f.label(language))
                .collect();
            markdown.push_str(&format!(
                "_{}: {}._\n",
                locale::missing_fields_note(language),
                labels.join(", ")
            ));
        }
        markdown
    }
}

impl Default for FormFillHandler {
    fn default() -> Self {
        Self::new(FormTemplateRegistry::standard())
    }
}

#[async_trait]
impl ToolHandler for FormFillHandler {
    fn tool_type(&self) -> ToolType {
        ToolType::FillForm
    }

    async fn execute(
        &self,
        arguments: &ToolArguments,
        context: &ExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let ToolArguments::FillForm(args) = arguments else {
            return Err(mismatch(self.tool_type(), arguments));
        };
        let query = required_query(self.tool_type(), args.query.as_deref())?;

        let template = args
            .form_type
            .as_deref()
            .and_then(|t| self.registry.get(t))
            .or_else(|| self.registry.match_query(query))
            .ok_or_else(|| ToolError::Execution {
                tool: self.tool_type(),
                message: "no form template matches the request".to_string(),
            })?;

        let (pre_filled_fields, missing_fields) =
            Self::prefill(template, &args.known_fields, &context.user_context);
        let form_markdown = Self::render(template, &pre_filled_fields, &missing_fields, context.language);

        Ok(ToolResult::Form(FormOutput {
            form_markdown,
            form_type: template.form_type.to_string(),
            pre_filled_fields,
            missing_fields,
        }))
    }
}
