//! 포인트 패턴 파싱
//!
//! 싱크에 넣을 수 있는 패턴은 단일 등호 비교 하나로만 이루어진
//! 포인트 패턴입니다 (예: `[file:hashes.MD5 = 'deadbeef']`).
//! AND/OR 합성 패턴이나 다른 비교 연산자는 지원하지 않습니다.

use bloomgate_core::event::PathValuePair;

/// 패턴 문자열에서 (객체 경로, 값) 쌍을 추출합니다.
///
/// 다음 조건을 모두 만족해야 `Some`을 반환합니다.
///
/// - 전체가 `[` `]`로 감싸여 있음
/// - 내부에 ` = ` 구분자가 정확히 하나 있음
/// - 값이 작은따옴표로 감싸여 있음
/// - 경로와 값이 비어 있지 않음
///
/// 합성 패턴(AND/OR)이나 형태가 다른 패턴은 `None`입니다.
pub fn parse_point_pattern(pattern: &str) -> Option<PathValuePair> {
    let inner = pattern
        .trim()
        .strip_prefix('[')?
        .strip_suffix(']')?
        .trim();

    // 구분자가 둘 이상이면 합성 패턴이거나 값에 비교식이 섞인 것
    let mut parts = inner.split(" = ");
    let path = parts.next()?.trim();
    let value_part = parts.next()?.trim();
    if parts.next().is_some() {
        return None;
    }

    // 합성 패턴 거부 (예: "[a = 'x' AND b = 'y']"는 위의 구분자 수
    // 검사에 걸리지만, "[a = 'x' OR b != 'y']" 같은 형태도 막아야 함)
    if contains_composite_operator(path) || contains_composite_operator(value_part) {
        return None;
    }

    let value = value_part.strip_prefix('\'')?.strip_suffix('\'')?;
    if path.is_empty() || value.is_empty() {
        return None;
    }

    Some(PathValuePair::new(path, value))
}

fn contains_composite_operator(s: &str) -> bool {
    s.split_whitespace()
        .any(|word| word == "AND" || word == "OR" || word == "FOLLOWEDBY")
}
