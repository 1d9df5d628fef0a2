use primitive_types::U256;
use thiserror::Error;

/// A 256-bit unsigned amount: prices, allowances, quantities and token ids.
pub type Amount = U256;

/// Unit scale used when nothing else is configured (10^18 smallest units).
pub const DEFAULT_UNIT_SCALE: u32 = 18;

/// Largest scale whose unit (10^scale) still fits in 256 bits.
pub const MAX_UNIT_SCALE: u32 = 77;

/// Errors raised while moving values in and out of the 256-bit domain
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Value out of range: {0}")]
    Range(String),

    #[error("Invalid amount '{input}': {details}")]
    Parse { input: String, details: String },

    #[error("Unit scale {0} exceeds the maximum of {MAX_UNIT_SCALE}")]
    Scale(u32),
}

// ── Wire form ─────────────────────────────────────────────────────────────────

/// Ledger representation of an [`Amount`]: two 128-bit limbs,
/// `value = high * 2^128 + low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Uint256 {
    pub low: u128,
    pub high: u128,
}

impl From<Amount> for Uint256 {
    fn from(value: Amount) -> Self {
        Self {
            low: value.low_u128(),
            high: (value >> 128).low_u128(),
        }
    }
}

impl From<Uint256> for Amount {
    fn from(limbs: Uint256) -> Self {
        (Amount::from(limbs.high) << 128) | Amount::from(limbs.low)
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Converts between human decimal text and the fixed-width ledger domain.
///
/// The unit scale is fixed at construction; 18 matches the payment token's
/// smallest unit (wei).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountCodec {
    unit_scale: u32,
}

impl Default for AmountCodec {
    fn default() -> Self {
        Self {
            unit_scale: DEFAULT_UNIT_SCALE,
        }
    }
}

impl AmountCodec {
    pub fn new(unit_scale: u32) -> Result<Self, AmountError> {
        if unit_scale > MAX_UNIT_SCALE {
            return Err(AmountError::Scale(unit_scale));
        }
        Ok(Self { unit_scale })
    }

    pub fn unit_scale(&self) -> u32 {
        self.unit_scale
    }

    /// Largest representable amount, 2^256 - 1.
    pub fn max_amount(&self) -> Amount {
        Amount::MAX
    }

    /// Parse a non-negative integer of arbitrary length.
    ///
    /// Fails with [`AmountError::Range`] when the value is at or above 2^256.
    pub fn parse_amount(&self, value: &str) -> Result<Amount, AmountError> {
        parse_integer(value.trim())
    }

    /// Encode an integer given as decimal text into ledger limbs.
    pub fn to_ledger_amount(&self, value: &str) -> Result<Uint256, AmountError> {
        self.parse_amount(value).map(Uint256::from)
    }

    pub fn from_ledger_amount(&self, limbs: Uint256) -> Amount {
        Amount::from(limbs)
    }

    /// Render `value` using this codec's unit scale.
    pub fn to_decimal_string(&self, value: Amount) -> String {
        to_decimal_string(value, self.unit_scale)
    }

    /// Parse human decimal text ("1.81") into smallest units.
    pub fn from_decimal_string(&self, text: &str) -> Result<Amount, AmountError> {
        from_decimal_string(text, self.unit_scale)
    }
}

/// Render `value / 10^unit_scale` as `"<whole>.<fraction>"`.
///
/// Trailing zeros of the fraction are stripped and the fraction is omitted
/// entirely when it is zero. Never fails for any 256-bit value. Callers go
/// through [`AmountCodec`], which bounds `unit_scale`.
fn to_decimal_string(value: Amount, unit_scale: u32) -> String {
    let digits = value.to_string();
    let scale = unit_scale as usize;
    if scale == 0 {
        return digits;
    }

    let padded = if digits.len() <= scale {
        format!("{}{}", "0".repeat(scale + 1 - digits.len()), digits)
    } else {
        digits
    };
    let (whole, fraction) = padded.split_at(padded.len() - scale);
    let fraction = fraction.trim_end_matches('0');

    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}

/// Parse human decimal text into an integer count of `10^-unit_scale` units.
fn from_decimal_string(text: &str, unit_scale: u32) -> Result<Amount, AmountError> {
    let text = text.trim();
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (text, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(parse_error(text, "no digits"));
    }
    if fraction.len() > unit_scale as usize {
        return Err(parse_error(
            text,
            &format!("more than {} fractional digits", unit_scale),
        ));
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(parse_error(text, "fraction must contain only digits"));
    }

    let mut digits = String::with_capacity(whole.len() + unit_scale as usize);
    digits.push_str(if whole.is_empty() { "0" } else { whole });
    digits.push_str(fraction);
    digits.push_str(&"0".repeat(unit_scale as usize - fraction.len()));

    parse_integer(&digits).map_err(|e| match e {
        AmountError::Parse { details, .. } => parse_error(text, &details),
        other => other,
    })
}

/// `price * quantity`, checked against the 256-bit ceiling.
pub fn checked_total(price: Amount, quantity: Amount) -> Result<Amount, AmountError> {
    price.checked_mul(quantity).ok_or_else(|| {
        AmountError::Range(format!(
            "{} * {} exceeds 2^256 - 1",
            price, quantity
        ))
    })
}

fn parse_integer(value: &str) -> Result<Amount, AmountError> {
    if value.is_empty() {
        return Err(parse_error(value, "no digits"));
    }
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(parse_error(value, "expected decimal digits only"));
    }
    // Only overflow remains once the digits are validated.
    Amount::from_dec_str(value)
        .map_err(|_| AmountError::Range(format!("{} exceeds 2^256 - 1", value)))
}

fn parse_error(input: &str, details: &str) -> AmountError {
    AmountError::Parse {
        input: input.to_string(),
        details: details.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitive_types::U512;
    use proptest::prelude::*;

    const MAX_DEC: &str =
        "115792089237316195423570985008687907853269984665640564039457584007913129639935";
    const TWO_POW_256: &str =
        "115792089237316195423570985008687907853269984665640564039457584007913129639936";

    #[test]
    fn test_round_trip_edges() {
        let codec = AmountCodec::default();
        let two_pow_128 = (Amount::one() << 128).to_string();
        let u128_max = u128::MAX.to_string();
        for value in ["0", "1", u128_max.as_str(), two_pow_128.as_str(), MAX_DEC] {
            let limbs = codec.to_ledger_amount(value).unwrap();
            assert_eq!(codec.from_ledger_amount(limbs).to_string(), value);
        }
    }

    #[test]
    fn test_limb_split() {
        let limbs = Uint256::from((Amount::from(7u8) << 128) + Amount::from(5u8));
        assert_eq!(limbs, Uint256 { low: 5, high: 7 });

        let max = Uint256::from(Amount::MAX);
        assert_eq!(max.low, u128::MAX);
        assert_eq!(max.high, u128::MAX);
    }

    #[test]
    fn test_to_ledger_amount_rejects_overflow() {
        let codec = AmountCodec::default();
        assert!(matches!(
            codec.to_ledger_amount(TWO_POW_256),
            Err(AmountError::Range(_))
        ));
        let huge = format!("{}0", MAX_DEC);
        assert!(matches!(
            codec.to_ledger_amount(&huge),
            Err(AmountError::Range(_))
        ));
    }

    #[test]
    fn test_to_ledger_amount_rejects_garbage() {
        let codec = AmountCodec::default();
        assert!(matches!(
            codec.to_ledger_amount("-1"),
            Err(AmountError::Parse { .. })
        ));
        assert!(matches!(
            codec.to_ledger_amount(""),
            Err(AmountError::Parse { .. })
        ));
        assert!(matches!(
            codec.to_ledger_amount("1.5"),
            Err(AmountError::Parse { .. })
        ));
    }

    #[test]
    fn test_to_decimal_string() {
        let e18 = Amount::exp10(18);
        assert_eq!(to_decimal_string(Amount::zero(), 18), "0");
        assert_eq!(
            to_decimal_string(Amount::from(181u64) * Amount::exp10(16), 18),
            "1.81"
        );
        assert_eq!(to_decimal_string(Amount::from(3u8) * e18, 18), "3");
        assert_eq!(to_decimal_string(Amount::one(), 18), "0.000000000000000001");
        assert_eq!(
            to_decimal_string(Amount::from(105u64) * Amount::exp10(16), 18),
            "1.05"
        );
        assert_eq!(to_decimal_string(Amount::from(42u8), 0), "42");
    }

    #[test]
    fn test_to_decimal_string_max_value() {
        let rendered = to_decimal_string(Amount::MAX, 18);
        assert_eq!(
            rendered,
            "115792089237316195423570985008687907853269984665640564039457.584007913129639935"
        );
        assert_eq!(to_decimal_string(Amount::from(5u8), 3), "0.005");
    }

    #[test]
    fn test_from_decimal_string() {
        let codec = AmountCodec::default();
        assert_eq!(
            codec.from_decimal_string("1.81").unwrap(),
            Amount::from(181u64) * Amount::exp10(16)
        );
        assert_eq!(
            codec.from_decimal_string("3").unwrap(),
            Amount::from(3u8) * Amount::exp10(18)
        );
        assert_eq!(
            codec.from_decimal_string(".5").unwrap(),
            Amount::from(5u8) * Amount::exp10(17)
        );
        assert_eq!(codec.from_decimal_string("0").unwrap(), Amount::zero());
    }

    #[test]
    fn test_from_decimal_string_errors() {
        let codec = AmountCodec::new(2).unwrap();
        for text in ["1.234", ".", "1.x"] {
            assert!(matches!(
                codec.from_decimal_string(text),
                Err(AmountError::Parse { .. })
            ));
        }
        assert!(matches!(
            codec.from_decimal_string(MAX_DEC),
            Err(AmountError::Range(_))
        ));
    }

    #[test]
    fn test_decimal_string_inverse() {
        let codec = AmountCodec::default();
        for text in ["0", "1.81", "3", "0.000000000000000001", "123456789.5"] {
            let amount = codec.from_decimal_string(text).unwrap();
            assert_eq!(codec.to_decimal_string(amount), text);
        }
    }

    #[test]
    fn test_checked_total() {
        let price = Amount::from(3u8) * Amount::exp10(18);
        assert_eq!(checked_total(price, Amount::one()).unwrap(), price);
        assert_eq!(checked_total(price, Amount::zero()).unwrap(), Amount::zero());
        assert!(matches!(
            checked_total(Amount::MAX, Amount::from(2u8)),
            Err(AmountError::Range(_))
        ));
    }

    #[test]
    fn test_codec_scale_bounds() {
        assert!(AmountCodec::new(MAX_UNIT_SCALE).is_ok());
        assert_eq!(AmountCodec::new(78), Err(AmountError::Scale(78)));
        assert_eq!(AmountCodec::default().unit_scale(), 18);
        assert_eq!(AmountCodec::default().max_amount(), Amount::MAX);
    }

    #[test]
    fn test_oversized_scale_never_reaches_rendering() {
        assert_eq!(AmountCodec::new(u32::MAX), Err(AmountError::Scale(u32::MAX)));

        // The widest accepted scale still renders the largest value.
        let widest = AmountCodec::new(MAX_UNIT_SCALE).unwrap();
        let rendered = widest.to_decimal_string(Amount::MAX);
        assert!(rendered.starts_with("1.157920892373161954"));
        assert_eq!(widest.from_decimal_string(&rendered).unwrap(), Amount::MAX);
    }

    // ── Properties over the whole 256-bit domain ─────────────────────────────

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_ledger_round_trip(limbs in any::<[u64; 4]>()) {
            let codec = AmountCodec::default();
            let value = U256(limbs);
            let encoded = codec.to_ledger_amount(&value.to_string()).unwrap();
            prop_assert_eq!(codec.from_ledger_amount(encoded), value);
        }

        #[test]
        fn prop_values_past_the_ceiling_are_range_errors(
            excess in any::<[u64; 4]>(),
            factor in 1u64..1_000_000,
        ) {
            // (2^256 + excess) * factor, always at or above 2^256.
            let ceiling = U512::from(Amount::MAX) + U512::one();
            let value = (ceiling + U512::from(U256(excess))) * U512::from(factor);
            let result = AmountCodec::default().to_ledger_amount(&value.to_string());
            prop_assert!(matches!(result, Err(AmountError::Range(_))));
        }

        #[test]
        fn prop_decimal_string_round_trip(
            limbs in any::<[u64; 4]>(),
            scale in 0u32..=MAX_UNIT_SCALE,
        ) {
            let codec = AmountCodec::new(scale).unwrap();
            let value = U256(limbs);
            let rendered = codec.to_decimal_string(value);
            prop_assert_eq!(codec.from_decimal_string(&rendered).unwrap(), value);
        }
    }
}
