//! Table-driven bit-field decoding for raw register values

/// One named bit-field inside a 64-bit register
///
/// `offset` is the index of the least significant bit, `width` the number of
/// bits. Layout tables guarantee `1 <= width <= 64` and `offset + width <= 64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub offset: u32,
    pub width: u32,
}

impl FieldSpec {
    pub const fn new(name: &'static str, offset: u32, width: u32) -> Self {
        Self {
            name,
            offset,
            width,
        }
    }

    /// Mask covering `width` low bits
    pub const fn mask(&self) -> u64 {
        if self.width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        }
    }

    /// Extract this field from a raw register value
    pub fn extract(&self, raw: u64) -> u64 {
        debug_assert!(
            self.width >= 1 && self.width <= 64,
            "field {} has invalid width {}",
            self.name,
            self.width
        );
        debug_assert!(
            self.offset + self.width <= 64,
            "field {} overflows the register ({} + {})",
            self.name,
            self.offset,
            self.width
        );

        (raw >> self.offset) & self.mask()
    }
}

/// Layout of a hardware register: its MSR address and ordered field table
///
/// # Example
///
/// ```
/// use wattflow_raw::register::{FieldSpec, RegisterLayout};
///
/// const DEMO: RegisterLayout = RegisterLayout::new(
///     "DEMO",
///     0x606,
///     &[FieldSpec::new("low", 0, 4), FieldSpec::new("high", 8, 5)],
/// );
///
/// let raw = 0x0A03;
/// assert_eq!(DEMO.field(raw, "low"), Some(3));
/// assert_eq!(DEMO.field(raw, "high"), Some(10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterLayout {
    pub name: &'static str,
    pub address: u64,
    pub fields: &'static [FieldSpec],
}

impl RegisterLayout {
    pub const fn new(name: &'static str, address: u64, fields: &'static [FieldSpec]) -> Self {
        Self {
            name,
            address,
            fields,
        }
    }

    /// Decode every field, in table order
    pub fn decode(&self, raw: u64) -> Vec<(&'static str, u64)> {
        self.fields
            .iter()
            .map(|field| (field.name, field.extract(raw)))
            .collect()
    }

    /// Decode a single field by name
    pub fn field(&self, raw: u64, name: &str) -> Option<u64> {
        self.spec(name).map(|field| field.extract(raw))
    }

    /// Look up a field definition by name
    pub fn spec(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNITS: RegisterLayout = RegisterLayout::new(
        "UNITS",
        0x606,
        &[
            FieldSpec::new("power", 0, 4),
            FieldSpec::new("energy", 8, 5),
            FieldSpec::new("time", 16, 4),
        ],
    );

    #[test]
    fn test_decode_in_table_order() {
        let raw = (10u64 << 16) | (16u64 << 8) | 3;
        assert_eq!(
            UNITS.decode(raw),
            vec![("power", 3), ("energy", 16), ("time", 10)]
        );
    }

    #[test]
    fn test_neighbouring_bits_are_masked_off() {
        // Reserved bits 4-7, 13-15 and 20-63 all set
        let raw = !0u64 & !(0xF) & !(0x1F << 8) & !(0xF << 16);
        assert_eq!(UNITS.field(raw, "power"), Some(0));
        assert_eq!(UNITS.field(raw, "energy"), Some(0));
        assert_eq!(UNITS.field(raw, "time"), Some(0));
    }

    #[test]
    fn test_full_width_field() {
        let field = FieldSpec::new("all", 0, 64);
        assert_eq!(field.extract(u64::MAX), u64::MAX);
        assert_eq!(field.mask(), u64::MAX);
    }

    #[test]
    fn test_top_bits_field() {
        let field = FieldSpec::new("top", 48, 16);
        assert_eq!(field.extract(0xBEEF_0000_0000_0000), 0xBEEF);
    }

    #[test]
    fn test_unknown_field_is_none() {
        assert_eq!(UNITS.field(0, "voltage"), None);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "overflows the register")]
    fn test_overflowing_field_asserts_in_debug() {
        FieldSpec::new("bad", 60, 8).extract(0);
    }
}
