//! Key schedule (§3, §4.1): a pure function of `(algorithm_id, overrides)`
//! producing the four 32-bit words every other component derives its
//! obfuscation from. No state, identical on big- and little-endian hosts —
//! every operation here is explicit `u32` wrapping arithmetic, never a
//! native-endian reinterpret.

/// The four key-schedule words: two footer guards and two entry masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySchedule {
    pub g0: u32,
    pub g1: u32,
    pub m: u32,
    pub c: u32,
}

/// Hard-coded quadruple for algorithm id 111, recovered from the original
/// `CPckAlgorithmId::SetAlgorithmId` switch case.
const ALGORITHM_111: KeySchedule = KeySchedule {
    g0: 0xAB12908F,
    g1: 0xB3231902,
    m: 0x2A63810E,
    c: 0x18734563,
};

/// Caller-supplied overrides for any of the four key-schedule words. A zero
/// value means "no override", matching the original `CustomPck*` parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyOverrides {
    pub g0: u32,
    pub g1: u32,
    pub m: u32,
    pub c: u32,
}

impl KeySchedule {
    pub fn derive(algorithm_id: u32, overrides: KeyOverrides) -> Self {
        let mut schedule = if algorithm_id == 111 {
            ALGORITHM_111
        } else {
            KeySchedule {
                g0: 0xFDFDFEEEu32.wrapping_add(algorithm_id.wrapping_mul(0x72341F2)),
                g1: 0xF00DBEEFu32.wrapping_add(algorithm_id.wrapping_mul(0x1237A73)),
                m: 0xA8937462u32.wrapping_add(algorithm_id.wrapping_mul(0xAB2321F)),
                c: 0x59374231u32.wrapping_add(algorithm_id.wrapping_mul(0x987A223)),
            }
        };

        if overrides.g0 != 0 {
            schedule.g0 = overrides.g0;
        }
        if overrides.g1 != 0 {
            schedule.g1 = overrides.g1;
        }
        if overrides.m != 0 {
            schedule.m = overrides.m;
        }
        if overrides.c != 0 {
            schedule.c = overrides.c;
        }
        schedule
    }

    /// `M` rotated left by `offset mod 32` bits — the mask xor'd into the
    /// numeric field at on-disk byte `offset` within a record (§4.5).
    pub fn field_mask(&self, offset: usize) -> u32 {
        self.m.rotate_left((offset % 32) as u32)
    }

    /// Low byte of `M`, xor'd bytewise into the `name` area (§4.5).
    pub fn name_mask(&self) -> u8 {
        self.m as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_111_is_hardcoded() {
        let k = KeySchedule::derive(111, KeyOverrides::default());
        assert_eq!(k, ALGORITHM_111);
    }

    #[test]
    fn default_formula_matches_spec() {
        let k = KeySchedule::derive(131, KeyOverrides::default());
        assert_eq!(k.g0, 0xFDFDFEEEu32.wrapping_add(131u32.wrapping_mul(0x72341F2)));
        assert_eq!(k.c, 0x59374231u32.wrapping_add(131u32.wrapping_mul(0x987A223)));
    }

    #[test]
    fn overrides_win_when_nonzero() {
        let k = KeySchedule::derive(
            0,
            KeyOverrides {
                g0: 0x1111_1111,
                g1: 0,
                m: 0x2222_2222,
                c: 0,
            },
        );
        assert_eq!(k.g0, 0x1111_1111);
        assert_eq!(k.m, 0x2222_2222);
        // g1/c unaffected by zero overrides
        assert_eq!(k.g1, 0xF00DBEEFu32.wrapping_add(0));
    }

    #[test]
    fn field_mask_rotates() {
        let k = KeySchedule {
            g0: 0,
            g1: 0,
            m: 1,
            c: 0,
        };
        assert_eq!(k.field_mask(0), 1);
        assert_eq!(k.field_mask(1), 2);
        assert_eq!(k.field_mask(31), 1 << 31);
        assert_eq!(k.field_mask(32), 1); // wraps mod 32
    }

    #[test]
    fn identical_on_any_host_endianness() {
        // all arithmetic here is on explicit u32 values, never a native-endian
        // transmute, so there is nothing host-endianness-dependent to assert
        // beyond: the same inputs always produce the same outputs.
        let a = KeySchedule::derive(161, KeyOverrides::default());
        let b = KeySchedule::derive(161, KeyOverrides::default());
        assert_eq!(a, b);
    }
}
