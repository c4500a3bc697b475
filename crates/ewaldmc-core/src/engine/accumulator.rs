use crate::core::io::record::{RecordError, RecordWriter, Records};

/// Running average and standard deviation of a sampled quantity.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accumulator {
    count: u64,
    sum: f64,
    sum_sq: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn accumulate(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let n = self.count as f64;
        let variance = (self.sum_sq - self.sum * self.sum / n) / (n - 1.0);
        variance.max(0.0).sqrt()
    }

    pub fn write_records(&self, prefix: &str, out: &mut RecordWriter) {
        out.list(
            prefix,
            &[self.count as f64, self.sum, self.sum_sq],
        );
    }

    pub fn from_records(prefix: &str, records: &Records) -> Result<Self, RecordError> {
        if records.raw(prefix).is_none() {
            return Ok(Self::default());
        }
        let values: Vec<f64> = records.list(prefix)?;
        match values.as_slice() {
            &[count, sum, sum_sq] => Ok(Self {
                count: count as u64,
                sum,
                sum_sq,
            }),
            _ => Err(records.invalid(prefix, format!("{:?}", values))),
        }
    }
}
