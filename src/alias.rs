//! Canonical action identifiers and the alias table that maps short names onto them.
//!
//! Aliases are stored in the environment mapping under mangled keys
//! (`ALIAS_JCR_PRINT` for `jcr:print`), so they follow environment scoping for
//! free and `--clear-env` drops them along with everything else. Resolution is a
//! single lookup: an alias never points at another alias.

use crate::env::EnvMap;

macro_rules! action_namespace {
    () => {
        "http://ns.nuke24.net/JavaCommandRunner36/Action/"
    };
}

const ACTION_NAMESPACE: &str = action_namespace!();

/// One of the built-in behaviors, named by a namespaced URI that is never dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Cat,
    DoCmd,
    Exit,
    FindExe,
    Print,
    PrintEnv,
    RunSysProc,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Cat,
        Action::DoCmd,
        Action::Exit,
        Action::FindExe,
        Action::Print,
        Action::PrintEnv,
        Action::RunSysProc,
    ];

    /// The canonical identifier, e.g. `http://ns.nuke24.net/JavaCommandRunner36/Action/Exit`.
    pub const fn uri(self) -> &'static str {
        match self {
            Action::Cat => concat!(action_namespace!(), "Cat"),
            Action::DoCmd => concat!(action_namespace!(), "DoCmd"),
            Action::Exit => concat!(action_namespace!(), "Exit"),
            Action::FindExe => concat!(action_namespace!(), "FindExe"),
            Action::Print => concat!(action_namespace!(), "Print"),
            Action::PrintEnv => concat!(action_namespace!(), "PrintEnv"),
            Action::RunSysProc => concat!(action_namespace!(), "RunSysProc"),
        }
    }

    /// Exact-match lookup of a canonical identifier.
    pub fn from_uri(uri: &str) -> Option<Action> {
        uri.strip_prefix(ACTION_NAMESPACE)?;
        Action::ALL.into_iter().find(|a| a.uri() == uri)
    }
}

/// Aliases injected at the top-level entry point unless `--no-std-aliases` is given.
pub const STANDARD_ALIASES: [(&str, Action); 6] = [
    ("jcr:cat", Action::Cat),
    ("jcr:docmd", Action::DoCmd),
    ("jcr:printenv", Action::PrintEnv),
    ("jcr:exit", Action::Exit),
    ("jcr:print", Action::Print),
    ("jcr:runsys", Action::RunSysProc),
];

pub fn standard_aliases() -> Vec<(String, String)> {
    STANDARD_ALIASES
        .iter()
        .map(|(name, action)| (name.to_string(), action.uri().to_string()))
        .collect()
}

/// Environment key under which the alias `name` is stored.
pub fn mangle_alias_key(name: &str) -> String {
    format!("ALIAS_{}", name.replace(':', "_").to_uppercase())
}

/// What `name` stands for in `env`, or `name` itself when it is not an alias.
pub fn dealias<'a>(name: &'a str, env: &'a EnvMap) -> &'a str {
    env.get(&mangle_alias_key(name)).unwrap_or(name)
}

/// `env` with every alias injected under its mangled key.
///
/// An empty alias list hands back a clone sharing `env`'s storage, so the caller
/// can tell (via [`EnvMap::shares_storage_with`]) that no copy was made.
pub fn with_aliases<N, T>(env: &EnvMap, aliases: impl IntoIterator<Item = (N, T)>) -> EnvMap
where
    N: AsRef<str>,
    T: Into<String>,
{
    let mut aliases = aliases.into_iter().peekable();
    let mut env = env.clone();
    if aliases.peek().is_some() {
        env.extend(aliases.map(|(name, target)| (mangle_alias_key(name.as_ref()), target)));
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mangle_alias_key() {
        assert_eq!(mangle_alias_key("jcr:print"), "ALIAS_JCR_PRINT");
        assert_eq!(mangle_alias_key("--clear-env"), "ALIAS_--CLEAR-ENV");
    }

    #[test]
    fn test_action_uri_round_trip() {
        for action in Action::ALL {
            assert_eq!(Action::from_uri(action.uri()), Some(action));
        }
        assert_eq!(Action::from_uri("jcr:print"), None);
        assert_eq!(Action::from_uri(ACTION_NAMESPACE), None);
    }

    #[test]
    fn test_action_uris_share_the_namespace() {
        assert_eq!(
            Action::RunSysProc.uri(),
            "http://ns.nuke24.net/JavaCommandRunner36/Action/RunSysProc"
        );
        for action in Action::ALL {
            let name = action.uri().strip_prefix(ACTION_NAMESPACE).unwrap();
            assert_eq!(name, format!("{action:?}"));
        }
    }

    #[test]
    fn test_dealias_is_one_hop() {
        let env = with_aliases(&EnvMap::new(), [("a", "b"), ("b", "c")]);
        assert_eq!(dealias("a", &env), "b");
        assert_eq!(dealias("b", &env), "c");
        assert_eq!(dealias("c", &env), "c");
    }

    #[test]
    fn test_dealias_with_standard_aliases() {
        let env = with_aliases(&EnvMap::new(), standard_aliases());
        for (name, action) in STANDARD_ALIASES {
            assert_eq!(dealias(name, &env), action.uri());
        }
        assert_eq!(dealias("jcr:findexe", &env), "jcr:findexe");
        assert_eq!(dealias("ls", &env), "ls");
    }

    #[test]
    fn test_with_no_aliases_makes_no_copy() {
        let env: EnvMap = [("X", "1")].into_iter().collect();
        let same = with_aliases(&env, Vec::<(String, String)>::new());
        assert!(same.shares_storage_with(&env));

        let copied = with_aliases(&env, [("x", "y")]);
        assert!(!copied.shares_storage_with(&env));
        assert_eq!(env.get("ALIAS_X"), None);
        assert_eq!(copied.get("ALIAS_X"), Some("y"));
    }
}
