//! Named parameter bundle and its flat-vector layout.
//!
//! The optimizer sees a single vector; blocks follow the declaration order of
//! the model (`intercept`, year and categorical effects, depth slope, the four
//! log-scale hyperparameters, then the two random fields). `epsilon_st` is
//! stored node-fastest, one year column after another.

use crate::data::CpueData;
use crate::model::ModelError;
use ndarray::{Array1, Array2, ShapeBuilder};
use serde::Serialize;

const SCALAR_BLOCKS: [&str; 6] = [
    "intercept",
    "beta_depth",
    "ln_tau_O",
    "ln_tau_E",
    "ln_kappa",
    "ln_obs",
];

/// Whether the driver treats a block as an estimated fixed effect or as a
/// latent field to integrate over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParameterKind {
    Fixed,
    Random,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterBlock {
    pub name: &'static str,
    pub offset: usize,
    pub len: usize,
    pub kind: ParameterKind,
}

impl ParameterBlock {
    #[inline]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Full parameter set of the model over the scalar type `D`.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters<D> {
    pub intercept: D,
    pub beta_year: Array1<D>,
    pub beta_geartype: Array1<D>,
    pub beta_month: Array1<D>,
    pub beta_hooksize: Array1<D>,
    pub beta_statarea: Array1<D>,
    pub beta_depth: D,
    pub ln_tau_o: D,
    pub ln_tau_e: D,
    pub ln_kappa: D,
    pub ln_obs: D,
    /// Spatial field, one value per mesh node.
    pub omega_s: Array1<D>,
    /// Spatiotemporal field, mesh nodes × years.
    pub epsilon_st: Array2<D>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterLayout {
    blocks: Vec<ParameterBlock>,
    n_nodes: usize,
    n_years: usize,
    total: usize,
}

impl ParameterLayout {
    pub fn for_data(data: &CpueData) -> Self {
        let levels = data.levels();
        Self::new(
            data.n_nodes(),
            data.n_years(),
            levels.geartype,
            levels.month,
            levels.hooksize,
            levels.statarea,
        )
    }

    pub fn new(
        n_nodes: usize,
        n_years: usize,
        n_geartype: usize,
        n_month: usize,
        n_hooksize: usize,
        n_statarea: usize,
    ) -> Self {
        use ParameterKind::{Fixed, Random};
        let sizes: [(&'static str, usize, ParameterKind); 13] = [
            ("intercept", 1, Fixed),
            ("beta_year", n_years, Fixed),
            ("beta_geartype", n_geartype, Fixed),
            ("beta_month", n_month, Fixed),
            ("beta_hooksize", n_hooksize, Fixed),
            ("beta_statarea", n_statarea, Fixed),
            ("beta_depth", 1, Fixed),
            ("ln_tau_O", 1, Fixed),
            ("ln_tau_E", 1, Fixed),
            ("ln_kappa", 1, Fixed),
            ("ln_obs", 1, Fixed),
            ("omega_s", n_nodes, Random),
            ("epsilon_st", n_nodes * n_years, Random),
        ];
        let mut offset = 0;
        let blocks = sizes
            .into_iter()
            .map(|(name, len, kind)| {
                let block = ParameterBlock {
                    name,
                    offset,
                    len,
                    kind,
                };
                offset += len;
                block
            })
            .collect();
        Self {
            blocks,
            n_nodes,
            n_years,
            total: offset,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.total
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    #[inline]
    pub fn blocks(&self) -> &[ParameterBlock] {
        &self.blocks
    }

    pub fn block(&self, name: &str) -> Option<&ParameterBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }

    /// Flat positions of the latent-field parameters.
    pub fn random_indices(&self) -> Vec<usize> {
        self.blocks
            .iter()
            .filter(|b| b.kind == ParameterKind::Random)
            .flat_map(|b| b.range())
            .collect()
    }

    /// Element names, e.g. `beta_year[3]` or `epsilon_st[12,4]`.
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.total);
        for block in &self.blocks {
            if block.name == "epsilon_st" {
                for t in 0..self.n_years {
                    for s in 0..self.n_nodes {
                        names.push(format!("epsilon_st[{s},{t}]"));
                    }
                }
            } else if SCALAR_BLOCKS.contains(&block.name) {
                names.push(block.name.to_string());
            } else {
                names.extend((0..block.len).map(|i| format!("{}[{i}]", block.name)));
            }
        }
        names
    }

    pub fn zeros(&self) -> Parameters<f64> {
        let len = |name: &str| self.block(name).map_or(0, |b| b.len);
        Parameters {
            intercept: 0.0,
            beta_year: Array1::zeros(self.n_years),
            beta_geartype: Array1::zeros(len("beta_geartype")),
            beta_month: Array1::zeros(len("beta_month")),
            beta_hooksize: Array1::zeros(len("beta_hooksize")),
            beta_statarea: Array1::zeros(len("beta_statarea")),
            beta_depth: 0.0,
            ln_tau_o: 0.0,
            ln_tau_e: 0.0,
            ln_kappa: 0.0,
            ln_obs: 0.0,
            omega_s: Array1::zeros(self.n_nodes),
            epsilon_st: Array2::zeros((self.n_nodes, self.n_years)),
        }
    }

    /// Check every block of `params` has the length this layout expects.
    pub fn validate<D>(&self, params: &Parameters<D>) -> Result<(), ModelError> {
        let lens = [
            ("beta_year", params.beta_year.len()),
            ("beta_geartype", params.beta_geartype.len()),
            ("beta_month", params.beta_month.len()),
            ("beta_hooksize", params.beta_hooksize.len()),
            ("beta_statarea", params.beta_statarea.len()),
            ("omega_s", params.omega_s.len()),
        ];
        for (name, found) in lens {
            let expected = self.block(name).map_or(0, |b| b.len);
            if found != expected {
                return Err(ModelError::DimensionMismatch {
                    what: name.to_string(),
                    expected,
                    found,
                });
            }
        }
        let (rows, cols) = params.epsilon_st.dim();
        if rows != self.n_nodes || cols != self.n_years {
            return Err(ModelError::DimensionMismatch {
                what: format!("epsilon_st ({rows}x{cols})"),
                expected: self.n_nodes * self.n_years,
                found: rows * cols,
            });
        }
        Ok(())
    }

    pub fn flatten<D: Copy>(&self, params: &Parameters<D>) -> Result<Vec<D>, ModelError> {
        self.validate(params)?;
        let mut theta = Vec::with_capacity(self.total);
        theta.push(params.intercept);
        theta.extend(params.beta_year.iter().copied());
        theta.extend(params.beta_geartype.iter().copied());
        theta.extend(params.beta_month.iter().copied());
        theta.extend(params.beta_hooksize.iter().copied());
        theta.extend(params.beta_statarea.iter().copied());
        theta.push(params.beta_depth);
        theta.push(params.ln_tau_o);
        theta.push(params.ln_tau_e);
        theta.push(params.ln_kappa);
        theta.push(params.ln_obs);
        theta.extend(params.omega_s.iter().copied());
        for t in 0..self.n_years {
            theta.extend(params.epsilon_st.column(t).iter().copied());
        }
        Ok(theta)
    }

    pub fn unflatten<D: Copy>(&self, theta: &[D]) -> Result<Parameters<D>, ModelError> {
        if theta.len() != self.total {
            return Err(ModelError::DimensionMismatch {
                what: "flat parameter vector".to_string(),
                expected: self.total,
                found: theta.len(),
            });
        }
        let slice = |name: &str| {
            let range = self.block(name).map_or(0..0, |b| b.range());
            &theta[range]
        };
        let scalar = |name: &str| slice(name)[0];
        let vector = |name: &str| Array1::from(slice(name).to_vec());
        let epsilon_st =
            Array2::from_shape_vec((self.n_nodes, self.n_years).f(), slice("epsilon_st").to_vec())
                .map_err(|e| ModelError::InvalidInput(format!("epsilon_st reshape: {e}")))?;
        Ok(Parameters {
            intercept: scalar("intercept"),
            beta_year: vector("beta_year"),
            beta_geartype: vector("beta_geartype"),
            beta_month: vector("beta_month"),
            beta_hooksize: vector("beta_hooksize"),
            beta_statarea: vector("beta_statarea"),
            beta_depth: scalar("beta_depth"),
            ln_tau_o: scalar("ln_tau_O"),
            ln_tau_e: scalar("ln_tau_E"),
            ln_kappa: scalar("ln_kappa"),
            ln_obs: scalar("ln_obs"),
            omega_s: vector("omega_s"),
            epsilon_st,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ParameterLayout {
        ParameterLayout::new(3, 2, 2, 12, 1, 4)
    }

    #[test]
    fn blocks_are_contiguous_in_declaration_order() {
        let layout = layout();
        let names: Vec<_> = layout.blocks().iter().map(|b| b.name).collect();
        assert_eq!(names.first(), Some(&"intercept"));
        assert_eq!(names.last(), Some(&"epsilon_st"));
        let mut expected = 0;
        for block in layout.blocks() {
            assert_eq!(block.offset, expected);
            expected += block.len;
        }
        assert_eq!(layout.len(), 1 + 2 + 2 + 12 + 1 + 4 + 1 + 4 + 3 + 6);
        assert_eq!(layout.names().len(), layout.len());
    }

    #[test]
    fn epsilon_is_flattened_node_fastest() {
        let layout = layout();
        let mut params = layout.zeros();
        params.epsilon_st[[2, 0]] = 7.0;
        params.epsilon_st[[0, 1]] = 9.0;
        let theta = layout.flatten(&params).expect("matching layout");
        let offset = layout.block("epsilon_st").expect("block").offset;
        assert_eq!(theta[offset + 2], 7.0);
        assert_eq!(theta[offset + 3], 9.0);
        assert_eq!(layout.names()[offset + 3], "epsilon_st[0,1]");

        let back = layout.unflatten(&theta).expect("matching length");
        assert_eq!(back, params);
    }

    #[test]
    fn names_cover_scalars_and_vectors() {
        let names = layout().names();
        assert_eq!(names[0], "intercept");
        assert_eq!(names[1], "beta_year[0]");
        assert!(names.contains(&"beta_depth".to_string()));
        assert!(names.contains(&"ln_tau_O".to_string()));
        assert!(names.contains(&"beta_hooksize[0]".to_string()));
    }

    #[test]
    fn random_indices_cover_both_fields() {
        let layout = layout();
        let random = layout.random_indices();
        assert_eq!(random.len(), 3 + 6);
        assert_eq!(random[0], layout.block("omega_s").expect("block").offset);
    }

    #[test]
    fn validate_rejects_short_blocks() {
        let layout = layout();
        let mut params = layout.zeros();
        params.beta_month = Array1::zeros(11);
        assert!(matches!(
            layout.validate(&params),
            Err(ModelError::DimensionMismatch { expected: 12, found: 11, .. })
        ));
        assert!(layout.unflatten(&[0.0; 3]).is_err());
    }
}
