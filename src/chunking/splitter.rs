//! 超长段落切分
//!
//! 回退分块路径中，单个段落可能远超目标大小（例如 PDF 抽取后没有空行的整页文字）。
//! 这里按分隔符优先级在窗口内寻找断点，保证每段不超过 `max_chars`（UTF-8 安全）。

/// 分隔符优先级（从高到低）
const SEPARATORS: &[&str] = &["\n", "; ", ". ", "。", "；", "! ", "? ", ", ", " "];

/// 将一段文本切成不超过 `max_chars` 个字符的片段；不产生重叠，重叠由上层累积器负责
pub fn split_oversized(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let total_chars = chars.len();

    if max_chars == 0 || total_chars <= max_chars {
        let trimmed = text.trim();
        return if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        };
    }

    let mut pieces = Vec::new();
    let mut current_idx = 0;

    while current_idx < total_chars {
        let target_end = (current_idx + max_chars).min(total_chars);
        let mut actual_end = target_end;

        // 不是文本末尾时，尝试在分隔符处断开
        if target_end < total_chars {
            let window: String = chars[current_idx..target_end].iter().collect();
            for sep in SEPARATORS {
                if let Some(pos) = window.rfind(sep) {
                    let chars_to_sep = window[..pos].chars().count() + sep.chars().count();
                    // 断点太靠前会产生碎片，要求至少走过半个窗口
                    if chars_to_sep * 2 >= max_chars {
                        actual_end = current_idx + chars_to_sep;
                        break;
                    }
                }
            }
        }

        // 确保至少前进一个字符
        if actual_end <= current_idx {
            actual_end = (current_idx + 1).min(total_chars);
        }

        let piece: String = chars[current_idx..actual_end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            pieces.push(trimmed.to_string());
        }

        current_idx = actual_end;
    }

    pieces
}

/// 取文本末尾 `n` 个字符（按字符而非字节计数）
pub fn tail_chars(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    match text.char_indices().nth(count - n) {
        Some((byte_idx, _)) => &text[byte_idx..],
        None => text,
    }
}
