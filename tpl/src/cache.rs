// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Compiled-template cache keyed by a `seahash` hash of the template
//! text. The original Go `tpl` package re-parsed every tag template on
//! every message; tag templates are operator-configured and change far
//! less often than messages arrive, so caching the parsed form avoids
//! redoing that work on the hot path.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::parse::{self, Node};

fn cache() -> &'static RwLock<HashMap<u64, Arc<Vec<Node>>>> {
    static CACHE: OnceLock<RwLock<HashMap<u64, Arc<Vec<Node>>>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

pub fn get_or_parse(template: &str) -> Result<Arc<Vec<Node>>, String> {
    let key = seahash::hash(template.as_bytes());

    if let Some(nodes) = cache().read().expect("template cache poisoned").get(&key) {
        return Ok(Arc::clone(nodes));
    }

    let nodes = Arc::new(parse::parse(template)?);
    cache()
        .write()
        .expect("template cache poisoned")
        .insert(key, Arc::clone(&nodes));
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reparses_only_on_first_lookup() {
        let a = get_or_parse("hello {{.org}}").unwrap();
        let b = get_or_parse("hello {{.org}}").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
