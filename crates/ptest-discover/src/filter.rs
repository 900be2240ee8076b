use ptest_core::{PtestError, Registry};

/// Build a new [`Registry`] with every test whose name appears in
/// `excluded` dropped, preserving `source`'s order. `source` is left
/// untouched.
pub fn exclude(source: &Registry, excluded: &[String]) -> Registry {
    let mut result = Registry::new();
    for test in source {
        if !excluded.iter().any(|name| name == &test.name) {
            result.push(test.clone());
        }
    }
    result
}

/// Build a new [`Registry`] containing one entry per name in `wanted`, in
/// the order given. `source` is left untouched; the result holds owned
/// copies.
pub fn filter(source: &Registry, wanted: &[String]) -> Result<Registry, PtestError> {
    if wanted.is_empty() || source.is_empty() {
        return Err(PtestError::InvalidInput(
            "filter requires a non-empty source registry and a non-empty name list".to_string(),
        ));
    }

    let mut result = Registry::new();
    for name in wanted {
        let test = source
            .by_name(name)
            .ok_or_else(|| PtestError::NotFound(name.clone()))?;
        result.push(test.clone());
    }
    Ok(result)
}
