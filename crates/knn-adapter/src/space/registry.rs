//! Static catalogue of the space identifiers the engine understands.

use knn_engine::DataLayout;

const DENSE_SPACES: &[&str] = &[
    "lp",
    "l1",
    "l2",
    "linf",
    "l2sqr_sift",
    "cosinesimil",
    "negdotprod",
    "angulardist",
    "kldivfast",
    "kldivfastrq",
    "kldivgenslow",
    "kldivgenfast",
    "kldivgenfastrq",
    "itakurasaitoslow",
    "itakurasaitofast",
    "itakurasaitofastrq",
    "jsdivslow",
    "jsdivfast",
    "jsdivfastapprox",
    "jsmetrslow",
    "jsmetrfast",
    "jsmetrfastapprox",
    "renyidiv_slow",
    "renyidiv_fast",
    "leven",
    "normleven",
    "bit_jaccard",
    "bit_hamming",
];

const SPARSE_SPACES: &[&str] = &[
    "lp_sparse",
    "l1_sparse",
    "l2_sparse",
    "linf_sparse",
    "cosinesimil_sparse",
    "cosinesimil_sparse_fast",
    "negdotprod_sparse",
    "negdotprod_sparse_fast",
    "angulardist_sparse",
    "angulardist_sparse_fast",
    "jaccard_sparse",
];

const PARAMETERIZED_SPACES: &[(&str, &str)] = &[
    ("lp", "p"),
    ("lp_sparse", "p"),
    ("renyidiv_slow", "alpha"),
    ("renyidiv_fast", "alpha"),
];

const DENSE_TO_SPARSE: &[(&str, &str)] = &[
    ("lp", "lp_sparse"),
    ("l1", "l1_sparse"),
    ("l2", "l2_sparse"),
    ("linf", "linf_sparse"),
    ("cosinesimil", "cosinesimil_sparse"),
    ("negdotprod", "negdotprod_sparse"),
    ("angulardist", "angulardist_sparse"),
    ("bit_jaccard", "jaccard_sparse"),
];

const SPARSE_TO_DENSE: &[(&str, &str)] = &[
    ("lp_sparse", "lp"),
    ("l1_sparse", "l1"),
    ("l2_sparse", "l2"),
    ("linf_sparse", "linf"),
    ("cosinesimil_sparse", "cosinesimil"),
    ("cosinesimil_sparse_fast", "cosinesimil"),
    ("negdotprod_sparse", "negdotprod"),
    ("negdotprod_sparse_fast", "negdotprod"),
    ("angulardist_sparse", "angulardist"),
    ("angulardist_sparse_fast", "angulardist"),
    ("jaccard_sparse", "bit_jaccard"),
];

/// The built-in registry.
pub static STANDARD_REGISTRY: SpaceRegistry = SpaceRegistry {
    dense: DENSE_SPACES,
    sparse: SPARSE_SPACES,
    parameterized: PARAMETERIZED_SPACES,
    dense_to_sparse: DENSE_TO_SPARSE,
    sparse_to_dense: SPARSE_TO_DENSE,
};

/// Dense and sparse space sets, their partial correspondences, and the
/// spaces that take a numeric parameter.
#[derive(Debug)]
pub struct SpaceRegistry {
    dense: &'static [&'static str],
    sparse: &'static [&'static str],
    parameterized: &'static [(&'static str, &'static str)],
    dense_to_sparse: &'static [(&'static str, &'static str)],
    sparse_to_dense: &'static [(&'static str, &'static str)],
}

impl SpaceRegistry {
    pub fn standard() -> &'static SpaceRegistry {
        &STANDARD_REGISTRY
    }

    /// Spaces valid for one layout.
    pub fn spaces(&self, layout: DataLayout) -> &'static [&'static str] {
        match layout {
            DataLayout::Dense => self.dense,
            DataLayout::Sparse => self.sparse,
        }
    }

    /// Every registered space, dense first.
    pub fn all(&self) -> Vec<&'static str> {
        self.dense.iter().chain(self.sparse).copied().collect()
    }

    pub fn contains(&self, layout: DataLayout, base: &str) -> bool {
        self.spaces(layout).contains(&base)
    }

    pub fn is_registered(&self, base: &str) -> bool {
        self.layout_of(base).is_some()
    }

    /// The layout whose set holds `base`.
    pub fn layout_of(&self, base: &str) -> Option<DataLayout> {
        [DataLayout::Dense, DataLayout::Sparse]
            .into_iter()
            .find(|&layout| self.contains(layout, base))
    }

    /// Name of the parameter `base` requires, if it is parameterized.
    pub fn required_parameter(&self, base: &str) -> Option<&'static str> {
        self.parameterized
            .iter()
            .find(|(name, _)| *name == base)
            .map(|(_, param)| *param)
    }

    pub fn parameterized_names(&self) -> Vec<&'static str> {
        self.parameterized.iter().map(|(name, _)| *name).collect()
    }

    /// The equivalent of `base` in the `target` layout.
    pub fn counterpart(&self, base: &str, target: DataLayout) -> Option<&'static str> {
        let map = match target {
            DataLayout::Sparse => self.dense_to_sparse,
            DataLayout::Dense => self.sparse_to_dense,
        };
        map.iter()
            .find(|(from, _)| *from == base)
            .map(|(_, to)| *to)
            .filter(|to| self.contains(target, to))
    }

    /// The `_fast` sibling of `base` in `layout`, if one is registered.
    pub fn fast_variant(&self, base: &str, layout: DataLayout) -> Option<&'static str> {
        let wanted = format!("{base}_fast");
        self.spaces(layout).iter().copied().find(|name| *name == wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_and_sparse_are_disjoint() {
        let registry = SpaceRegistry::standard();
        for name in registry.spaces(DataLayout::Dense) {
            assert!(!registry.contains(DataLayout::Sparse, name), "{name}");
        }
    }

    #[test]
    fn test_parameterized_spaces_are_registered_once() {
        let registry = SpaceRegistry::standard();
        for name in registry.parameterized_names() {
            let dense = registry.contains(DataLayout::Dense, name);
            let sparse = registry.contains(DataLayout::Sparse, name);
            assert!(dense ^ sparse, "{name}");
        }
    }

    #[test]
    fn test_correspondence_targets_are_registered() {
        for (from, to) in DENSE_TO_SPARSE {
            assert!(DENSE_SPACES.contains(from), "{from}");
            assert!(SPARSE_SPACES.contains(to), "{to}");
        }
        for (from, to) in SPARSE_TO_DENSE {
            assert!(SPARSE_SPACES.contains(from), "{from}");
            assert!(DENSE_SPACES.contains(to), "{to}");
        }
    }

    #[test]
    fn test_counterparts_and_fast_variants() {
        let registry = SpaceRegistry::standard();
        assert_eq!(registry.counterpart("l2", DataLayout::Sparse), Some("l2_sparse"));
        assert_eq!(
            registry.counterpart("negdotprod_sparse_fast", DataLayout::Dense),
            Some("negdotprod")
        );
        assert_eq!(registry.counterpart("kldivfast", DataLayout::Sparse), None);
        assert_eq!(
            registry.fast_variant("cosinesimil_sparse", DataLayout::Sparse),
            Some("cosinesimil_sparse_fast")
        );
        assert_eq!(registry.fast_variant("l2_sparse", DataLayout::Sparse), None);
        assert_eq!(registry.fast_variant("negdotprod", DataLayout::Dense), None);
    }

    #[test]
    fn test_layout_of() {
        let registry = SpaceRegistry::standard();
        assert_eq!(registry.layout_of("leven"), Some(DataLayout::Dense));
        assert_eq!(registry.layout_of("jaccard_sparse"), Some(DataLayout::Sparse));
        assert_eq!(registry.layout_of("euclidean"), None);
        assert_eq!(registry.all().len(), 39);
    }
}
