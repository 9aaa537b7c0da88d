//! Serde helpers for wire-format fields.

/// Token amounts cross the wire as base-unit integers in decimal strings,
/// never floats and never hex quantities.
pub mod u256_decimal {
	use alloy::primitives::U256;
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&value.to_string())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;
		U256::from_str_radix(raw.trim(), 10)
			.map_err(|_| serde::de::Error::custom(format!("invalid decimal amount: {}", raw)))
	}
}

#[cfg(test)]
mod tests {
	use alloy::primitives::U256;
	use serde::{Deserialize, Serialize};

	#[derive(Debug, Serialize, Deserialize)]
	struct Amount {
		#[serde(with = "super::u256_decimal")]
		payment: U256,
	}

	#[test]
	fn serializes_as_decimal_string() {
		let amount = Amount {
			payment: U256::from(1_000_000u64),
		};
		let json = serde_json::to_string(&amount).unwrap();
		assert_eq!(json, r#"{"payment":"1000000"}"#);
	}

	#[test]
	fn deserializes_decimal_string() {
		let amount: Amount = serde_json::from_str(r#"{"payment":"42"}"#).unwrap();
		assert_eq!(amount.payment, U256::from(42u64));
	}

	#[test]
	fn rejects_hex_and_float() {
		assert!(serde_json::from_str::<Amount>(r#"{"payment":"0x2a"}"#).is_err());
		assert!(serde_json::from_str::<Amount>(r#"{"payment":"1.5"}"#).is_err());
		assert!(serde_json::from_str::<Amount>(r#"{"payment":1000000}"#).is_err());
	}
}
