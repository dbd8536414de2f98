use crate::error::{RelmonError, Result};

/// Run token used for every category except "Data".
pub const ALL_RUNS: &str = "all_runs";

/// Pieces of a DQM harvesting file name:
/// `DQM_V0001_R<run>__<dataset>__<release>-<processing>-<version>__DQMIO.root`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DqmFileName<'a> {
    pub run: &'a str,
    pub dataset: &'a str,
    pub processing: &'a str,
}

/// Key grouping items that must be compared with each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub dataset: String,
    pub run: String,
}

impl<'a> DqmFileName<'a> {
    pub fn parse(file_name: &'a str) -> Result<Self> {
        let malformed = || RelmonError::MalformedFileName(file_name.to_string());
        let mut parts = file_name.split("__");
        let head = parts.next().ok_or_else(malformed)?;
        let dataset = parts.next().filter(|d| !d.is_empty()).ok_or_else(malformed)?;
        let processing = parts
            .next()
            .and_then(|p| p.split('-').nth(1))
            .ok_or_else(malformed)?;
        let run = head.rsplit('_').next().unwrap_or(head);

        Ok(Self {
            run,
            dataset,
            processing,
        })
    }

    pub fn bucket_key(&self, by_run: bool) -> BucketKey {
        BucketKey {
            dataset: self.dataset.to_string(),
            run: if by_run { self.run } else { ALL_RUNS }.to_string(),
        }
    }

    /// Dataset plus processing string, without run or timestamp noise.
    pub fn canonical(&self) -> String {
        format!("{}_{}", self.dataset, self.processing)
    }
}
