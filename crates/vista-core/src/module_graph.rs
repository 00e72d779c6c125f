//! Module dependency walk.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use crate::engine::{ModuleNode, ModuleResolver};
use crate::types::ModuleGraphData;

/// Virtual module injected into browser runs; never part of a user graph.
pub const BROWSER_CONTEXT_MODULE: &str = "\0@vista/browser/context";

static VERSION_QUERY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\?v=\w+$").unwrap());

/// Strip the `?v=<hash>` cache suffix from a module id.
pub fn clear_id(id: &str) -> String {
    VERSION_QUERY.replace(id, "").into_owned()
}

fn is_framework_module(id: &str) -> bool {
    id.contains("/vista/dist/")
}

/// Walk the imports of `entry` and classify every reachable module.
///
/// Each module is visited once; cycles are fine. A module the resolver
/// externalizes is recorded under its rewritten id.
pub async fn build_module_graph(resolver: &dyn ModuleResolver, entry: &str) -> ModuleGraphData {
    let mut data = ModuleGraphData::default();
    let Some(root) = resolver.module_by_id(entry) else {
        return data;
    };
    if root.id.is_empty() || root.id == BROWSER_CONTEXT_MODULE {
        return data;
    }

    let mut externalized = BTreeSet::new();
    let mut inlined = BTreeSet::new();
    // Raw module id -> id it is recorded under.
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut pending: Vec<(ModuleNode, String)> = Vec::new();

    let root_id = classify(resolver, &root, &mut externalized, &mut inlined).await;
    let _ = seen.insert(root.id.clone(), root_id.clone());
    pending.push((root, root_id));

    while let Some((module, id)) = pending.pop() {
        let mut edges = Vec::new();
        for import in &module.imported {
            if import.is_empty() || is_framework_module(import) || import == BROWSER_CONTEXT_MODULE {
                continue;
            }
            if let Some(recorded) = seen.get(import) {
                edges.push(recorded.clone());
                continue;
            }
            let Some(child) = resolver.module_by_id(import) else {
                continue;
            };
            let child_id = classify(resolver, &child, &mut externalized, &mut inlined).await;
            let _ = seen.insert(import.clone(), child_id.clone());
            edges.push(child_id.clone());
            pending.push((child, child_id));
        }
        let _ = data.graph.insert(id, edges);
    }

    data.externalized = externalized.into_iter().collect();
    data.inlined = inlined.into_iter().collect();
    data
}

async fn classify(
    resolver: &dyn ModuleResolver,
    module: &ModuleNode,
    externalized: &mut BTreeSet<String>,
    inlined: &mut BTreeSet<String>,
) -> String {
    let id = clear_id(&module.id);
    if let Some(rewritten) = resolver.externalize(module, &id).await {
        let _ = externalized.insert(rewritten.clone());
        rewritten
    } else {
        let _ = inlined.insert(id.clone());
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Modules {
        nodes: HashMap<String, ModuleNode>,
    }

    impl Modules {
        fn new(edges: &[(&str, &[&str])]) -> Self {
            let nodes = edges
                .iter()
                .map(|(id, imports)| {
                    (
                        (*id).to_owned(),
                        ModuleNode {
                            id: (*id).to_owned(),
                            file: None,
                            imported: imports.iter().map(|s| (*s).to_owned()).collect(),
                        },
                    )
                })
                .collect();
            Self { nodes }
        }
    }

    #[async_trait]
    impl ModuleResolver for Modules {
        fn module_by_id(&self, id: &str) -> Option<ModuleNode> {
            self.nodes.get(id).cloned()
        }

        async fn externalize(&self, _module: &ModuleNode, id: &str) -> Option<String> {
            id.contains("/node_modules/").then(|| format!("file://{id}"))
        }
    }

    #[test]
    fn clears_version_suffix() {
        assert_eq!(clear_id("/src/a.ts?v=1a2b"), "/src/a.ts");
        assert_eq!(clear_id("/src/a.ts?import"), "/src/a.ts?import");
    }

    #[tokio::test]
    async fn walks_and_classifies() {
        let modules = Modules::new(&[
            ("/src/a.test.ts", &["/src/util.ts?v=9f", "/node_modules/dep/index.js", "/x/vista/dist/index.js"]),
            ("/src/util.ts?v=9f", &["/src/a.test.ts"]),
            ("/node_modules/dep/index.js", &[]),
            ("/x/vista/dist/index.js", &[]),
        ]);

        let data = build_module_graph(&modules, "/src/a.test.ts").await;

        assert_eq!(
            data.graph["/src/a.test.ts"],
            vec!["/src/util.ts", "file:///node_modules/dep/index.js"]
        );
        assert_eq!(data.graph["/src/util.ts"], vec!["/src/a.test.ts"]);
        assert_eq!(data.graph["file:///node_modules/dep/index.js"], Vec::<String>::new());
        assert!(!data.graph.contains_key("/x/vista/dist/index.js"));
        assert_eq!(data.inlined, vec!["/src/a.test.ts", "/src/util.ts"]);
        assert_eq!(data.externalized, vec!["file:///node_modules/dep/index.js"]);
    }

    #[tokio::test]
    async fn skips_browser_context_and_unknown_entry() {
        let modules = Modules::new(&[
            ("/src/b.test.ts", &[BROWSER_CONTEXT_MODULE]),
            (BROWSER_CONTEXT_MODULE, &[]),
        ]);
        let data = build_module_graph(&modules, "/src/b.test.ts").await;
        assert_eq!(data.graph.len(), 1);
        assert!(data.graph["/src/b.test.ts"].is_empty());

        assert_eq!(build_module_graph(&modules, "/missing.ts").await, ModuleGraphData::default());
    }

    #[tokio::test]
    async fn deep_chain_does_not_recurse() {
        let ids: Vec<String> = (0..20_000).map(|i| format!("/m{i}.ts")).collect();
        let nodes = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                (
                    id.clone(),
                    ModuleNode {
                        id: id.clone(),
                        file: None,
                        imported: ids.get(i + 1).cloned().into_iter().collect(),
                    },
                )
            })
            .collect();
        let data = build_module_graph(&Modules { nodes }, "/m0.ts").await;
        assert_eq!(data.graph.len(), 20_000);
    }
}
