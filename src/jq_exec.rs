//! jq pre-processing of JSON inputs (front end only).
use anyhow::{anyhow, Context, Result};
use jaq_core::{load, Compiler, Ctx, RcIter};
use jaq_json::Val;
use serde_json::Value;

/// Run `filter` over `input`; every jq output becomes one example document.
pub fn filter_documents(filter: &str, input: &Value) -> Result<Vec<Value>> {
    let arena = load::Arena::default();
    let modules = load::Loader::new(jaq_std::defs().chain(jaq_json::defs()))
        .load(&arena, load::File { code: filter, path: () })
        .map_err(|errs| {
            report(filter, errs.into_iter().map(|(_, err)| format!("cannot parse: {err:?}")))
        })?;

    let compiled = Compiler::default()
        .with_funs(jaq_std::funs().chain(jaq_json::funs()))
        .compile(modules)
        .map_err(|errs| {
            report(
                filter,
                errs.into_iter()
                    .flat_map(|(_, undefined)| undefined)
                    .map(|(name, what)| format!("undefined {what:?} `{name}`")),
            )
        })?;

    let inputs = RcIter::new(core::iter::empty());
    let documents: Result<Vec<Value>> = compiled
        .run((Ctx::new([], &inputs), Val::from(input.clone())))
        .map(|output| {
            let output = output.map_err(|e| anyhow!("jq filter `{filter}` failed: {e:?}"))?;
            // Val displays as JSON text
            let text = output.to_string();
            serde_json::from_str(&text).with_context(|| format!("jq output is not JSON: {text}"))
        })
        .collect();
    documents
}

fn report(filter: &str, problems: impl Iterator<Item = String>) -> anyhow::Error {
    let problems: Vec<String> = problems.collect();
    anyhow!("jq filter `{filter}`: {}", problems.join("; "))
}
