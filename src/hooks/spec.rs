//! Hook declarations and their action filters.

use serde::Deserialize;

/// Action names given either as a comma-separated string or as a list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ActionList {
    Csv(String),
    List(Vec<String>),
}

impl ActionList {
    /// Normalized names: trimmed, lowercased, blanks dropped.
    pub fn into_names(self) -> Vec<String> {
        let names: Vec<String> = match self {
            ActionList::Csv(csv) => csv.split(',').map(str::to_string).collect(),
            ActionList::List(list) => list,
        };
        names
            .into_iter()
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect()
    }
}

impl From<&str> for ActionList {
    fn from(csv: &str) -> Self {
        ActionList::Csv(csv.to_string())
    }
}

impl From<Vec<String>> for ActionList {
    fn from(list: Vec<String>) -> Self {
        ActionList::List(list)
    }
}

/// Raw `only` / `except` options of a hook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HookOptions {
    #[serde(default)]
    pub only: Option<ActionList>,
    #[serde(default)]
    pub except: Option<ActionList>,
}

/// Which actions a hook runs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookFilter {
    All,
    Only(Vec<String>),
    Except(Vec<String>),
}

impl HookFilter {
    pub fn applies_to(&self, action: &str) -> bool {
        let action = action.to_lowercase();
        match self {
            HookFilter::All => true,
            HookFilter::Only(names) => names.iter().any(|name| *name == action),
            HookFilter::Except(names) => !names.iter().any(|name| *name == action),
        }
    }
}

impl From<HookOptions> for HookFilter {
    /// `only` wins when both are given.
    fn from(options: HookOptions) -> Self {
        match (options.only, options.except) {
            (Some(only), _) => HookFilter::Only(only.into_names()),
            (None, Some(except)) => HookFilter::Except(except.into_names()),
            (None, None) => HookFilter::All,
        }
    }
}

/// A named hook bound to an action filter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawHookSpec")]
pub struct HookSpec {
    pub method: String,
    pub filter: HookFilter,
}

impl HookSpec {
    /// Hook that runs before every action.
    pub fn always(method: impl Into<String>) -> Self {
        Self::with_options(method, HookOptions::default())
    }

    pub fn with_options(method: impl Into<String>, options: HookOptions) -> Self {
        Self {
            method: method.into(),
            filter: options.into(),
        }
    }

    pub fn only(method: impl Into<String>, actions: impl Into<ActionList>) -> Self {
        Self::with_options(
            method,
            HookOptions {
                only: Some(actions.into()),
                except: None,
            },
        )
    }

    pub fn except(method: impl Into<String>, actions: impl Into<ActionList>) -> Self {
        Self::with_options(
            method,
            HookOptions {
                only: None,
                except: Some(actions.into()),
            },
        )
    }

    pub fn applies_to(&self, action: &str) -> bool {
        self.filter.applies_to(action)
    }
}

#[derive(Deserialize)]
struct RawHookSpec {
    method: String,
    #[serde(default)]
    only: Option<ActionList>,
    #[serde(default)]
    except: Option<ActionList>,
}

impl From<RawHookSpec> for HookSpec {
    fn from(raw: RawHookSpec) -> Self {
        HookSpec::with_options(
            raw.method,
            HookOptions {
                only: raw.only,
                except: raw.except,
            },
        )
    }
}
