//! Observation data for the CPUE model.
//!
//! Categorical covariates are held as [`Factor`]s whose codes are checked
//! against the number of coefficients they index when they are built, so
//! coefficient lookups during evaluation can never go out of bounds.

use crate::model::ModelError;
use crate::precision::SpdeMatrices;
use ndarray::Array1;

/// Observed log-CPUE; `None` marks a missing observation.
pub type LogCpue = Option<f64>;

#[inline]
pub fn is_missing(value: LogCpue) -> bool {
    value.is_none()
}

/// Integer-coded categorical covariate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Factor {
    name: String,
    codes: Vec<usize>,
    n_levels: usize,
}

impl Factor {
    pub fn new(
        name: impl Into<String>,
        codes: Vec<usize>,
        n_levels: usize,
    ) -> Result<Self, ModelError> {
        let name = name.into();
        if let Some((row, &code)) = codes.iter().enumerate().find(|&(_, &c)| c >= n_levels) {
            return Err(ModelError::LevelOutOfRange {
                factor: name,
                row,
                code,
                n_levels,
            });
        }
        Ok(Self {
            name,
            codes,
            n_levels,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn n_levels(&self) -> usize {
        self.n_levels
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    #[inline]
    pub fn codes(&self) -> &[usize] {
        &self.codes
    }

    #[inline]
    pub fn code(&self, row: usize) -> usize {
        self.codes[row]
    }
}

/// One fishing event, as delivered by the data-preparation layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub site: usize,
    pub year: usize,
    pub geartype: usize,
    pub month: usize,
    pub hooksize: usize,
    pub statarea: usize,
    pub depth: f64,
    pub log_cpue: LogCpue,
}

/// Number of coefficients behind each fixed-effect factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactorLevels {
    pub geartype: usize,
    pub month: usize,
    pub hooksize: usize,
    pub statarea: usize,
}

/// Column store of observations plus the SPDE mesh they are indexed on.
#[derive(Debug, Clone)]
pub struct CpueData {
    site: Factor,
    year: Factor,
    geartype: Factor,
    month: Factor,
    hooksize: Factor,
    statarea: Factor,
    depth: Array1<f64>,
    log_cpue: Vec<LogCpue>,
    spde: SpdeMatrices,
}

impl CpueData {
    /// `site` must index mesh nodes and `year` must index `[0, n_years)`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        site: Factor,
        year: Factor,
        geartype: Factor,
        month: Factor,
        hooksize: Factor,
        statarea: Factor,
        depth: Array1<f64>,
        log_cpue: Vec<LogCpue>,
        spde: SpdeMatrices,
    ) -> Result<Self, ModelError> {
        let n = log_cpue.len();
        for factor in [&site, &year, &geartype, &month, &hooksize, &statarea] {
            if factor.len() != n {
                return Err(ModelError::DimensionMismatch {
                    what: format!("{} codes", factor.name()),
                    expected: n,
                    found: factor.len(),
                });
            }
        }
        if depth.len() != n {
            return Err(ModelError::DimensionMismatch {
                what: "depth".to_string(),
                expected: n,
                found: depth.len(),
            });
        }
        if site.n_levels() != spde.n_nodes() {
            return Err(ModelError::DimensionMismatch {
                what: "site levels vs mesh nodes".to_string(),
                expected: spde.n_nodes(),
                found: site.n_levels(),
            });
        }
        if year.n_levels() == 0 {
            return Err(ModelError::InvalidInput(
                "at least one year is required".to_string(),
            ));
        }
        if let Some(row) = depth.iter().position(|d| !d.is_finite()) {
            return Err(ModelError::InvalidInput(format!(
                "depth at row {row} is not finite"
            )));
        }
        if let Some(row) = log_cpue
            .iter()
            .position(|v| v.is_some_and(|x| !x.is_finite()))
        {
            return Err(ModelError::InvalidInput(format!(
                "observed log-CPUE at row {row} is not finite; use None for missing values"
            )));
        }

        let n_missing = log_cpue.iter().filter(|v| is_missing(**v)).count();
        log::debug!(
            "CPUE data: {} observations ({} missing), {} mesh nodes, {} years",
            n,
            n_missing,
            spde.n_nodes(),
            year.n_levels()
        );

        Ok(Self {
            site,
            year,
            geartype,
            month,
            hooksize,
            statarea,
            depth,
            log_cpue,
            spde,
        })
    }

    /// Build the column store from row records.
    pub fn from_observations(
        observations: &[Observation],
        n_years: usize,
        levels: FactorLevels,
        spde: SpdeMatrices,
    ) -> Result<Self, ModelError> {
        fn column(observations: &[Observation], f: impl Fn(&Observation) -> usize) -> Vec<usize> {
            observations.iter().map(f).collect()
        }
        let obs = observations;
        let site = Factor::new("site", column(obs, |o| o.site), spde.n_nodes())?;
        let year = Factor::new("year", column(obs, |o| o.year), n_years)?;
        let geartype = Factor::new("geartype", column(obs, |o| o.geartype), levels.geartype)?;
        let month = Factor::new("month", column(obs, |o| o.month), levels.month)?;
        let hooksize = Factor::new("hooksize", column(obs, |o| o.hooksize), levels.hooksize)?;
        let statarea = Factor::new("statarea", column(obs, |o| o.statarea), levels.statarea)?;
        let depth = observations.iter().map(|o| o.depth).collect::<Array1<f64>>();
        let log_cpue = observations.iter().map(|o| o.log_cpue).collect();
        Self::new(
            site, year, geartype, month, hooksize, statarea, depth, log_cpue, spde,
        )
    }

    #[inline]
    pub fn site(&self) -> &Factor {
        &self.site
    }

    #[inline]
    pub fn year(&self) -> &Factor {
        &self.year
    }

    #[inline]
    pub fn geartype(&self) -> &Factor {
        &self.geartype
    }

    #[inline]
    pub fn month(&self) -> &Factor {
        &self.month
    }

    #[inline]
    pub fn hooksize(&self) -> &Factor {
        &self.hooksize
    }

    #[inline]
    pub fn statarea(&self) -> &Factor {
        &self.statarea
    }

    #[inline]
    pub fn depth(&self) -> &Array1<f64> {
        &self.depth
    }

    #[inline]
    pub fn log_cpue(&self) -> &[LogCpue] {
        &self.log_cpue
    }

    #[inline]
    pub fn spde(&self) -> &SpdeMatrices {
        &self.spde
    }

    #[inline]
    pub fn n_observations(&self) -> usize {
        self.log_cpue.len()
    }

    #[inline]
    pub fn n_years(&self) -> usize {
        self.year.n_levels()
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.spde.n_nodes()
    }

    pub fn levels(&self) -> FactorLevels {
        FactorLevels {
            geartype: self.geartype.n_levels(),
            month: self.month.n_levels(),
            hooksize: self.hooksize.n_levels(),
            statarea: self.statarea.n_levels(),
        }
    }

    /// Copy with the listed observations marked missing.
    pub fn with_missing(&self, rows: &[usize]) -> Result<Self, ModelError> {
        let mut out = self.clone();
        for &row in rows {
            let slot = out.log_cpue.get_mut(row).ok_or_else(|| {
                ModelError::InvalidInput(format!(
                    "row {row} is outside {} observations",
                    self.n_observations()
                ))
            })?;
            *slot = None;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_rejects_code_beyond_levels() {
        let err = Factor::new("month", vec![0, 3, 12], 12).expect_err("code 12 of 12 levels");
        match err {
            ModelError::LevelOutOfRange {
                factor,
                row,
                code,
                n_levels,
            } => {
                assert_eq!(factor, "month");
                assert_eq!((row, code, n_levels), (2, 12, 12));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_predicate_only_flags_none() {
        assert!(is_missing(None));
        assert!(!is_missing(Some(0.0)));
        assert!(!is_missing(Some(-3.5)));
    }
}
