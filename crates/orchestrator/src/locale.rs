//! Fixed user-facing strings in each supported language

use crate::context::Language;

pub fn apology(language: Language) -> &'static str {
    match language {
        Language::Vi => {
            "Xin lỗi, hiện tại tôi chưa thể trả lời câu hỏi này. Bạn vui lòng thử lại sau \
             hoặc liên hệ phòng công tác sinh viên để được hỗ trợ."
        }
        Language::En => {
            "Sorry, I can't answer this question right now. Please try again later or \
             contact the student affairs office for help."
        }
    }
}

pub fn no_internal_information(language: Language) -> &'static str {
    match language {
        Language::Vi => "Tôi không tìm thấy thông tin nội bộ liên quan đến câu hỏi này.",
        Language::En => "I couldn't find any internal information related to this question.",
    }
}

pub fn default_clarification(language: Language) -> &'static str {
    match language {
        Language::Vi => "Bạn có thể nói rõ hơn bạn đang cần thông tin gì không?",
        Language::En => "Could you tell me a bit more about what you need?",
    }
}

pub fn missing_fields_note(language: Language) -> &'static str {
    match language {
        Language::Vi => "Vui lòng điền các mục còn trống",
        Language::En => "Please complete the remaining fields",
    }
}
