//! Dataset descriptors.

use crate::chunk::IndexRegion;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A variable: an ordered subset of the dataset dimensions and an item size.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Dimension names, outermost first.
    pub dims: Vec<String>,
    /// Size of one item in bytes.
    pub itemsize: u64,
    /// Optional dtype label (e.g. "float32"), carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<String>,
}

impl Variable {
    /// Create a new variable over `dims`.
    pub fn new<I, S>(dims: I, itemsize: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dims: dims.into_iter().map(Into::into).collect(),
            itemsize,
            dtype: None,
        }
    }

    /// Attach a dtype label.
    pub fn with_dtype(mut self, dtype: impl Into<String>) -> Self {
        self.dtype = Some(dtype.into());
        self
    }

    /// Returns true if the variable spans `dim`.
    pub fn has_dim(&self, dim: &str) -> bool {
        self.dims.iter().any(|d| d == dim)
    }

    /// Bytes needed for this variable over `region`.
    pub fn nbytes(&self, region: &IndexRegion) -> u64 {
        self.dims
            .iter()
            .map(|d| region.extent(d))
            .product::<u64>()
            * self.itemsize
    }

    /// Shape of this variable's buffer over `region`, in variable dimension order.
    pub fn shape(&self, region: &IndexRegion) -> Vec<u64> {
        self.dims.iter().map(|d| region.extent(d)).collect()
    }
}

/// Dimension sizes and variables of a dataset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    /// Dimension name to size.
    pub dims: BTreeMap<String, u64>,
    /// Variable name to variable.
    #[serde(default)]
    pub variables: BTreeMap<String, Variable>,
}

impl DatasetDescriptor {
    /// Create a descriptor with the given dimensions and no variables.
    pub fn new<I, S>(dims: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        Self {
            dims: dims.into_iter().map(|(d, s)| (d.into(), s)).collect(),
            variables: BTreeMap::new(),
        }
    }

    /// Add a variable.
    pub fn with_variable(mut self, name: impl Into<String>, variable: Variable) -> Self {
        self.variables.insert(name.into(), variable);
        self
    }

    /// Size of `dim`.
    pub fn dim_size(&self, dim: &str) -> Option<u64> {
        self.dims.get(dim).copied()
    }

    /// Dimensions used by at least one variable.
    pub fn used_dims(&self) -> BTreeSet<&str> {
        self.variables
            .values()
            .flat_map(|v| v.dims.iter().map(String::as_str))
            .collect()
    }

    /// Region covering the whole dataset.
    pub fn full_region(&self) -> IndexRegion {
        IndexRegion::from_ranges(self.dims.iter().map(|(d, s)| (d.clone(), 0..*s)))
    }

    /// Bytes needed for all variables over `region`.
    pub fn nbytes(&self, region: &IndexRegion) -> u64 {
        self.variables.values().map(|v| v.nbytes(region)).sum()
    }

    /// Bytes needed for all variables over a region with the given extents.
    pub fn nbytes_for_extents(&self, extents: &BTreeMap<String, u64>) -> u64 {
        self.variables
            .values()
            .map(|v| {
                v.dims
                    .iter()
                    .map(|d| extents.get(d).copied().unwrap_or(1))
                    .product::<u64>()
                    * v.itemsize
            })
            .sum()
    }

    /// Check dimension sizes and variable definitions.
    pub fn validate(&self) -> Result<()> {
        for (dim, size) in &self.dims {
            if *size == 0 {
                return Err(Error::Configuration(format!(
                    "dimension {dim} must have a positive size"
                )));
            }
        }
        for (name, var) in &self.variables {
            if var.itemsize == 0 {
                return Err(Error::Configuration(format!(
                    "variable {name} must have a positive itemsize"
                )));
            }
            let mut seen = BTreeSet::new();
            for dim in &var.dims {
                if !self.dims.contains_key(dim) {
                    return Err(Error::Configuration(format!(
                        "variable {name} uses unknown dimension {dim}"
                    )));
                }
                if !seen.insert(dim.as_str()) {
                    return Err(Error::Configuration(format!(
                        "variable {name} repeats dimension {dim}"
                    )));
                }
            }
        }
        self.checked_total_nbytes()?;
        Ok(())
    }

    /// Total bytes of the dataset, rejecting sizes that overflow `u64`.
    ///
    /// Every region is contained in the full dataset, so once this passes the
    /// unchecked per-region byte counts cannot overflow either.
    pub fn checked_total_nbytes(&self) -> Result<u64> {
        let mut total: u64 = 0;
        for (name, var) in &self.variables {
            let nbytes = var
                .dims
                .iter()
                .map(|d| self.dims.get(d).copied().unwrap_or(1))
                .try_fold(var.itemsize, u64::checked_mul)
                .ok_or_else(|| {
                    Error::Configuration(format!("variable {name} byte size overflows u64"))
                })?;
            total = total.checked_add(nbytes).ok_or_else(|| {
                Error::Configuration("dataset byte size overflows u64".to_string())
            })?;
        }
        Ok(total)
    }
}
