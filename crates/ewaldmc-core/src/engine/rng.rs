use crate::core::io::record::{RecordError, RecordWriter, Records};
use rand::{Error, Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// The engine-local random stream. Its full state is part of every checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McRng {
    inner: ChaCha8Rng,
}

impl McRng {
    pub fn seed_from_u64(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    #[inline]
    pub fn uniform(&mut self) -> f64 {
        self.inner.r#gen::<f64>()
    }

    pub fn write_records(&self, out: &mut RecordWriter) {
        let seed: String = self
            .inner
            .get_seed()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        out.record("rngSeed", seed);
        out.record("rngStream", self.inner.get_stream());
        out.record("rngWordPos", self.inner.get_word_pos());
    }

    pub fn from_records(records: &Records) -> Result<Self, RecordError> {
        let hex: String = records.required("rngSeed")?;
        if hex.len() != 64 || !hex.is_ascii() {
            return Err(records.invalid("rngSeed", hex));
        }
        let mut seed = [0u8; 32];
        for (i, byte) in seed.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[2 * i..2 * i + 2], 16)
                .map_err(|_| records.invalid("rngSeed", hex.clone()))?;
        }
        let mut inner = ChaCha8Rng::from_seed(seed);
        inner.set_stream(records.required("rngStream")?);
        inner.set_word_pos(records.required("rngWordPos")?);
        Ok(Self { inner })
    }
}

impl RngCore for McRng {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.inner.try_fill_bytes(dest)
    }
}
