//! Builds live collections and views from a [`DataLayerConfig`]

use crate::error::{ConfigError, Result};
use crate::models::{DataLayerConfig, FilterSpec, ProxySpec, SorterSpec, StoreSpec, ViewSpec};
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use strata_core::{
    BackingCollection, CollectionConfig, DerivedView, FileProxy, MemoryProxy, RecordAccess,
    Source, StoreError, StoreRegistry,
};
use strata_model::Model;
use tracing::{debug, info, warn};

/// Every store and view declared by a configuration.
///
/// The data layer owns the handles; its registry only resolves ids.
#[derive(Debug, Default)]
pub struct DataLayer {
    models: BTreeMap<String, Arc<Model>>,
    stores: BTreeMap<String, BackingCollection>,
    views: BTreeMap<String, DerivedView>,
    autoload: Vec<String>,
    registry: StoreRegistry,
}

impl DataLayer {
    /// Validate `config` and build its stores, then its views in
    /// dependency order.
    pub fn build(config: DataLayerConfig) -> Result<Self> {
        let mut layer = DataLayer::default();

        for model in config.models {
            let name = model.name.clone();
            if layer.models.insert(name.clone(), Arc::new(model)).is_some() {
                return Err(ConfigError::DuplicateId { kind: "model", id: name });
            }
        }

        for spec in &config.stores {
            layer.build_store(spec)?;
        }

        let ordered = order_views(&config.views, &layer.stores)?;
        for spec in ordered {
            layer.build_view(spec)?;
        }

        info!(
            models = layer.models.len(),
            stores = layer.stores.len(),
            views = layer.views.len(),
            "data layer built"
        );
        Ok(layer)
    }

    /// Load every store marked `autoload`, concurrently.
    ///
    /// Returns each store id with the number of records it loaded.
    pub async fn autoload(&self) -> std::result::Result<Vec<(String, usize)>, StoreError> {
        let pending: Vec<_> = self
            .autoload
            .iter()
            .filter_map(|id| self.stores.get(id).map(|store| (id.clone(), store.load())))
            .collect();

        let (ids, loads): (Vec<String>, Vec<_>) = pending.into_iter().unzip();
        let results = join_all(loads).await;

        ids.into_iter()
            .zip(results)
            .map(|(id, result)| match result {
                Ok(records) => Ok((id, records.len())),
                Err(err) => {
                    warn!(store_id = %id, error = %err, "autoload failed");
                    Err(err)
                }
            })
            .collect()
    }

    pub fn registry(&self) -> &StoreRegistry {
        &self.registry
    }

    /// Store or view registered as `id`
    pub fn get(&self, id: &str) -> Option<Source> {
        self.registry.lookup(id)
    }

    pub fn store(&self, id: &str) -> Option<&BackingCollection> {
        self.stores.get(id)
    }

    pub fn view(&self, id: &str) -> Option<&DerivedView> {
        self.views.get(id)
    }

    pub fn model(&self, name: &str) -> Option<&Arc<Model>> {
        self.models.get(name)
    }

    /// Ids of every store and view, with their current visible counts
    pub fn summary(&self) -> Vec<(String, usize)> {
        self.registry
            .ids()
            .into_iter()
            .filter_map(|id| self.get(&id).map(|source| (id, source.get_count())))
            .collect()
    }

    fn ensure_unique(&self, id: &str) -> Result<()> {
        if self.stores.contains_key(id) || self.views.contains_key(id) {
            return Err(ConfigError::DuplicateId {
                kind: "store",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn build_store(&mut self, spec: &StoreSpec) -> Result<()> {
        self.ensure_unique(&spec.id)?;
        let model = self
            .models
            .get(&spec.model)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownModel {
                store: spec.id.clone(),
                model: spec.model.clone(),
            })?;

        let config = CollectionConfig {
            store_id: Some(spec.id.clone()),
            duplicate_policy: spec.duplicate_policy,
            reader: spec.reader.clone(),
        };
        let store = BackingCollection::with_config(model, config);
        match &spec.proxy {
            Some(ProxySpec::Memory { rows }) => store.set_proxy(MemoryProxy::new(rows.clone())),
            Some(ProxySpec::File { path }) => store.set_proxy(FileProxy::new(path.clone())),
            None => {}
        }
        if spec.autoload {
            if spec.proxy.is_none() {
                warn!(store_id = %spec.id, "autoload requested without a proxy; skipping");
            } else {
                self.autoload.push(spec.id.clone());
            }
        }

        apply_queries(&Source::from(&store), &spec.id, &spec.sorters, &spec.filters)?;
        self.registry.register(spec.id.clone(), &store);
        debug!(store_id = %spec.id, model = %spec.model, "store built");
        self.stores.insert(spec.id.clone(), store);
        Ok(())
    }

    fn build_view(&mut self, spec: &ViewSpec) -> Result<()> {
        self.ensure_unique(&spec.id)?;
        let view = DerivedView::from_registry(&self.registry, &spec.source)?;

        apply_queries(&Source::from(&view), &spec.id, &spec.sorters, &spec.filters)?;
        self.registry.register(spec.id.clone(), &view);
        debug!(view_id = %spec.id, source = %spec.source, "view built");
        self.views.insert(spec.id.clone(), view);
        Ok(())
    }
}

fn apply_queries(
    target: &Source,
    owner: &str,
    sorters: &[SorterSpec],
    filters: &[FilterSpec],
) -> Result<()> {
    if !sorters.is_empty() {
        let sorters = sorters
            .iter()
            .map(|spec| spec.to_sorter(owner))
            .collect::<Result<Vec<_>>>()?;
        target.get_sorters().replace(sorters)?;
    }
    if !filters.is_empty() {
        let filters = filters
            .iter()
            .map(|spec| spec.to_filter(owner))
            .collect::<Result<Vec<_>>>()?;
        target.get_filters().add_all(filters)?;
    }
    Ok(())
}

/// Order views so each comes after its source
fn order_views<'a>(
    views: &'a [ViewSpec],
    stores: &BTreeMap<String, BackingCollection>,
) -> Result<Vec<&'a ViewSpec>> {
    let declared: BTreeSet<&str> = views.iter().map(|v| v.id.as_str()).collect();
    for view in views {
        if !stores.contains_key(&view.source) && !declared.contains(view.source.as_str()) {
            return Err(ConfigError::UnknownSource {
                view: view.id.clone(),
                source_id: view.source.clone(),
            });
        }
    }

    let mut ready: BTreeSet<&str> = BTreeSet::new();
    let mut ordered: Vec<&ViewSpec> = Vec::with_capacity(views.len());
    let mut remaining: Vec<&ViewSpec> = views.iter().collect();

    while !remaining.is_empty() {
        let (next, blocked): (Vec<&ViewSpec>, Vec<&ViewSpec>) =
            remaining.into_iter().partition(|view| {
                stores.contains_key(&view.source) || ready.contains(view.source.as_str())
            });
        if next.is_empty() {
            return Err(ConfigError::Cycle {
                views: blocked.iter().map(|v| v.id.clone()).collect(),
            });
        }
        ready.extend(next.iter().map(|v| v.id.as_str()));
        ordered.extend(next);
        remaining = blocked;
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(id: &str, source: &str) -> ViewSpec {
        ViewSpec {
            id: id.to_string(),
            source: source.to_string(),
            sorters: Vec::new(),
            filters: Vec::new(),
        }
    }

    fn stores() -> BTreeMap<String, BackingCollection> {
        let mut stores = BTreeMap::new();
        stores.insert(
            "users".to_string(),
            BackingCollection::new(Arc::new(Model::new("User"))),
        );
        stores
    }

    #[test]
    fn views_are_ordered_after_their_sources() {
        let views = vec![view("c", "b"), view("b", "a"), view("a", "users")];
        let ordered: Vec<&str> = order_views(&views, &stores())
            .unwrap()
            .into_iter()
            .map(|v| v.id.as_str())
            .collect();
        assert_eq!(ordered, ["a", "b", "c"]);
    }

    #[test]
    fn cycles_and_unknown_sources_are_rejected() {
        let views = vec![view("a", "b"), view("b", "a"), view("ok", "users")];
        match order_views(&views, &stores()) {
            Err(ConfigError::Cycle { views }) => assert_eq!(views, ["a", "b"]),
            other => panic!("expected cycle, got {other:?}"),
        }

        let views = vec![view("a", "missing")];
        assert!(matches!(
            order_views(&views, &stores()),
            Err(ConfigError::UnknownSource { .. })
        ));
    }
}
