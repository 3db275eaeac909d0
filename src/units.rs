// どこで: 金額とアドレスの表示変換
// 何を: 10 進文字列 ⇄ 18 桁固定小数点整数の変換、アドレスの短縮表示
// なぜ: コントラクト境界の数値はすべて 10^18 スケールの整数で受け渡すため

use ethers::types::{Address, U256};
use ethers::utils::{format_units, to_checksum};
use thiserror::Error;

pub const DECIMALS: u32 = 18;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitsError {
    #[error("金額が空です")]
    Empty,
    #[error("金額を数値として解釈できません: {0}")]
    Malformed(String),
    #[error("金額は正の値である必要があります: {0}")]
    NonPositive(String),
    #[error("金額が大きすぎます: {0}")]
    Overflow(String),
    #[error("固定小数点の整形に失敗しました: {0}")]
    Format(String),
}

/// Parses a user-entered decimal string into an 18-decimal fixed-point integer.
/// Zero, negative and non-numeric input are rejected, and so is anything that
/// does not fit in a `U256` once scaled. Digits past the 18th decimal place are
/// dropped.
pub fn parse_amount(input: &str) -> Result<U256, UnitsError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UnitsError::Empty);
    }

    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let value = scale_decimal(digits).map_err(|e| match e {
        ScaleError::Malformed => UnitsError::Malformed(trimmed.to_string()),
        ScaleError::Overflow => UnitsError::Overflow(trimmed.to_string()),
    })?;
    if negative || value.is_zero() {
        return Err(UnitsError::NonPositive(trimmed.to_string()));
    }
    Ok(value)
}

enum ScaleError {
    Malformed,
    Overflow,
}

fn scale_decimal(digits: &str) -> Result<U256, ScaleError> {
    let (integer, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (integer.is_empty() && fraction.is_empty()) || !is_digits(integer) || !is_digits(fraction)
    {
        return Err(ScaleError::Malformed);
    }

    let whole = if integer.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(integer).map_err(|_| ScaleError::Overflow)?
    };
    let places = DECIMALS as usize;
    let kept = &fraction[..fraction.len().min(places)];
    let padded = format!("{:0<width$}", kept, width = places);
    let fraction = U256::from_dec_str(&padded).map_err(|_| ScaleError::Malformed)?;

    whole
        .checked_mul(U256::exp10(places))
        .and_then(|scaled| scaled.checked_add(fraction))
        .ok_or(ScaleError::Overflow)
}

/// Formats an 18-decimal fixed-point integer as a decimal string that keeps at
/// least one fractional digit (`1e18` -> `"1.0"`, `0` -> `"0.0"`).
pub fn format_amount(value: U256) -> Result<String, UnitsError> {
    let raw = format_units(value, DECIMALS).map_err(|e| UnitsError::Format(e.to_string()))?;
    Ok(trim_fraction(&raw))
}

fn trim_fraction(raw: &str) -> String {
    let Some((integer, fraction)) = raw.split_once('.') else {
        return format!("{}.0", raw);
    };
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        format!("{}.0", integer)
    } else {
        format!("{}.{}", integer, fraction)
    }
}

/// `0x1234...abcd` 形式の短縮表示
pub fn shorten_address(address: &Address) -> String {
    let full = to_checksum(address, None);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wei(whole: u64) -> U256 {
        U256::from(whole) * U256::exp10(18)
    }

    #[test]
    fn formats_whole_and_zero_amounts() {
        assert_eq!(format_amount(wei(1)).unwrap(), "1.0");
        assert_eq!(format_amount(U256::zero()).unwrap(), "0.0");
        assert_eq!(format_amount(wei(100)).unwrap(), "100.0");
    }

    #[test]
    fn formats_fractional_amounts() {
        let one_and_half = wei(1) + U256::exp10(17) * 5;
        assert_eq!(format_amount(one_and_half).unwrap(), "1.5");
        assert_eq!(format_amount(U256::one()).unwrap(), "0.000000000000000001");
    }

    #[test]
    fn formatted_amounts_parse_back() {
        let samples = [
            wei(1),
            wei(10),
            U256::one(),
            U256::from(123_456_789u64),
            wei(5) + U256::exp10(15) * 7,
            U256::from(u128::MAX),
        ];
        for value in samples {
            let text = format_amount(value).unwrap();
            assert_eq!(parse_amount(&text).unwrap(), value, "round trip of {}", text);
        }
    }

    #[test]
    fn parses_user_input() {
        assert_eq!(parse_amount("10").unwrap(), wei(10));
        assert_eq!(parse_amount(" 5 ").unwrap(), wei(5));
        assert_eq!(parse_amount("1.0").unwrap(), wei(1));
        assert_eq!(parse_amount("0.5").unwrap(), U256::exp10(17) * 5);
    }

    #[test]
    fn rejects_non_positive_and_garbage() {
        assert_eq!(parse_amount(""), Err(UnitsError::Empty));
        assert_eq!(parse_amount("   "), Err(UnitsError::Empty));
        assert!(matches!(parse_amount("0"), Err(UnitsError::NonPositive(_))));
        assert!(matches!(parse_amount("0.0"), Err(UnitsError::NonPositive(_))));
        assert!(matches!(parse_amount("-3"), Err(UnitsError::NonPositive(_))));
        assert!(matches!(parse_amount("abc"), Err(UnitsError::Malformed(_))));
        assert!(matches!(parse_amount("1.2.3"), Err(UnitsError::Malformed(_))));
    }

    #[test]
    fn rejects_amounts_that_overflow_once_scaled() {
        let scaled_too_far = format!("1{}", "0".repeat(60));
        assert!(matches!(
            parse_amount(&scaled_too_far),
            Err(UnitsError::Overflow(_))
        ));
        let beyond_u256 = "9".repeat(100);
        assert!(matches!(
            parse_amount(&beyond_u256),
            Err(UnitsError::Overflow(_))
        ));
        // 10^59 * 10^18 は U256 に収まる
        let largest = format!("1{}", "0".repeat(59));
        assert_eq!(parse_amount(&largest).unwrap(), U256::exp10(77));
    }

    #[test]
    fn drops_digits_past_eighteen_places() {
        assert_eq!(parse_amount(".5").unwrap(), U256::exp10(17) * 5);
        assert_eq!(
            parse_amount("1.0000000000000000019").unwrap(),
            U256::exp10(18) + U256::one()
        );
        assert!(matches!(
            parse_amount("0.0000000000000000001"),
            Err(UnitsError::NonPositive(_))
        ));
        assert!(matches!(parse_amount("."), Err(UnitsError::Malformed(_))));
        assert!(matches!(parse_amount("1e5"), Err(UnitsError::Malformed(_))));
    }

    #[test]
    fn shortens_checksummed_address() {
        let address: Address = "0xf367150C56b9c8C14db60914C82D1b278cfA7A6D".parse().unwrap();
        assert_eq!(shorten_address(&address), "0xf367...7A6D");
    }
}
