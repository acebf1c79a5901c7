//! Train / validation / test partitioning.
//!
//! Splits take the trailing fraction of the items in their existing order.
//! Nothing is shuffled, so the file-name order of the folder decides which
//! images are held out.

use tracing::{info, warn};

use crate::{
    dataset::ImageItem,
    error::{DatasetError, DatasetResult},
};

/// Default fraction of all images held out for testing.
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;

/// Default fraction of the training part held out for validation.
pub const DEFAULT_VALIDATION_FRACTION: f64 = 0.1;

/// Splits off the trailing `fraction` of `items`.
///
/// The head keeps `floor(len * (1 - fraction))` items.
pub fn split_tail<T>(mut items: Vec<T>, fraction: f64) -> (Vec<T>, Vec<T>) {
    let split_at = ((items.len() as f64) * (1.0 - fraction)).floor() as usize;
    let tail = items.split_off(split_at.min(items.len()));
    (items, tail)
}

/// The three partitions used by one training run.
#[derive(Debug, Clone)]
pub struct DatasetSplits {
    pub train: Vec<ImageItem>,
    pub validation: Vec<ImageItem>,
    pub test: Vec<ImageItem>,
}

impl DatasetSplits {
    /// Holds out the trailing `test_fraction` for testing, then the trailing
    /// `validation_fraction` of what remains for validation.
    ///
    /// # Errors
    ///
    /// Fails if a fraction is outside `[0, 1)` or the train or test split is empty.
    pub fn new(
        items: Vec<ImageItem>,
        test_fraction: f64,
        validation_fraction: f64,
    ) -> DatasetResult<Self> {
        check_fraction("test", test_fraction)?;
        check_fraction("validation", validation_fraction)?;

        let total = items.len();
        let (train, test) = split_tail(items, test_fraction);
        let (train, validation) = split_tail(train, validation_fraction);

        if train.is_empty() {
            return Err(DatasetError::EmptySplit {
                split: "train",
                total,
            });
        }
        if test.is_empty() {
            return Err(DatasetError::EmptySplit {
                split: "test",
                total,
            });
        }
        if validation.is_empty() {
            warn!(total, "validation split is empty, validation loss will not be reported");
        }

        info!(
            train = train.len(),
            validation = validation.len(),
            test = test.len(),
            "split dataset"
        );
        Ok(Self {
            train,
            validation,
            test,
        })
    }
}

fn check_fraction(split: &'static str, fraction: f64) -> DatasetResult<()> {
    if (0.0..1.0).contains(&fraction) {
        Ok(())
    } else {
        Err(DatasetError::InvalidSplitFraction { split, fraction })
    }
}
