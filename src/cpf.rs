//! CPF (Cadastro de Pessoas Físicas) check-digit validation.
//!
//! A CPF has 9 base digits followed by 2 check digits. Each check digit is a
//! weighted sum of the digits before it, folded through `((sum * 10) % 11) % 10`.
use serde_json::Value;

/// Number of digits in a normalized CPF.
pub const CPF_LEN: usize = 11;

/// Strips every non-digit character, keeping the digits in order.
pub fn digits(cpf: &str) -> String {
    cpf.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Computes the check digit for the given prefix.
///
/// Weights run from `prefix.len() + 1` down to 2, so a 9-digit prefix yields
/// the first check digit and a 10-digit prefix yields the second.
pub fn check_digit(prefix: &[u8]) -> u8 {
    let weight_start = prefix.len() as u32 + 1;
    let sum: u32 = prefix
        .iter()
        .enumerate()
        .map(|(i, &d)| u32::from(d) * (weight_start - i as u32))
        .sum();

    ((sum * 10 % 11) % 10) as u8
}

/// Validates a CPF given as text. Punctuation such as `111.444.777-35` is ignored.
///
/// Never panics: any malformed input simply returns `false`.
pub fn is_valid_cpf(cpf: &str) -> bool {
    let numbers: Vec<u8> = cpf
        .chars()
        .filter_map(|c| c.to_digit(10))
        .map(|d| d as u8)
        .collect();

    if numbers.len() != CPF_LEN {
        return false;
    }

    // Sequences like 000.000.000-00 satisfy the formula but are never issued
    if numbers.iter().all(|&d| d == numbers[0]) {
        return false;
    }

    check_digit(&numbers[..9]) == numbers[9] && check_digit(&numbers[..10]) == numbers[10]
}

/// Validates a CPF taken straight from a JSON payload. Anything that is not a
/// JSON string is rejected.
pub fn is_valid_cpf_value(value: &Value) -> bool {
    match value {
        Value::String(s) => is_valid_cpf(s),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reference_cpf_is_valid() {
        assert!(is_valid_cpf("11144477735"));
        assert!(is_valid_cpf("529.982.247-25"));
    }

    #[test]
    fn test_punctuation_is_stripped() {
        assert!(is_valid_cpf("111.444.777-35"));
        assert!(is_valid_cpf(" 111 444 777 35 "));
        assert_eq!(digits("111.444.777-35"), "11144477735");
    }

    #[test]
    fn test_wrong_check_digits_rejected() {
        assert!(!is_valid_cpf("12345678900"));
        assert!(!is_valid_cpf("11144477734"));
        assert!(!is_valid_cpf("11144477725"));
    }

    #[test]
    fn test_repeated_digits_rejected() {
        for d in 0..=9 {
            let cpf = d.to_string().repeat(11);
            assert!(!is_valid_cpf(&cpf), "{} should be rejected", cpf);
        }
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(!is_valid_cpf("123"));
        assert!(!is_valid_cpf(""));
        assert!(!is_valid_cpf("111444777350"));
        assert!(!is_valid_cpf("abc.def.ghi-jk"));
    }

    #[test]
    fn test_non_text_values_rejected() {
        assert!(!is_valid_cpf_value(&json!(12345678901u64)));
        assert!(!is_valid_cpf_value(&json!(11144477735u64)));
        assert!(!is_valid_cpf_value(&json!(null)));
        assert!(!is_valid_cpf_value(&json!(["11144477735"])));
        assert!(is_valid_cpf_value(&json!("11144477735")));
    }

    #[test]
    fn test_check_digit_formula() {
        // 111444777 -> first digit 3, 1114447773 -> second digit 5
        assert_eq!(check_digit(&[1, 1, 1, 4, 4, 4, 7, 7, 7]), 3);
        assert_eq!(check_digit(&[1, 1, 1, 4, 4, 4, 7, 7, 7, 3]), 5);
    }
}
