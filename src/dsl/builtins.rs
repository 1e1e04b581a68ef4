/// How many arguments a builtin accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Range(usize, usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::Range(lo, hi) => (lo..=hi).contains(&count),
            Arity::AtLeast(n) => count >= n,
        }
    }

    pub fn describe(self) -> String {
        let plural = |n: usize| if n == 1 { "argument" } else { "arguments" };
        match self {
            Arity::Exact(n) => format!("{n} {}", plural(n)),
            Arity::Range(lo, hi) => format!("{lo} to {hi} arguments"),
            Arity::AtLeast(n) => format!("at least {n} {}", plural(n)),
        }
    }
}

/// Built-in function available to every rule, function and choice function.
/// The runtime provides the implementation; the compiler only checks that calls exist.
#[derive(Debug, Clone)]
pub struct BuiltinFn {
    pub name: &'static str,
    pub arity: Arity,
    pub category: &'static str,
    pub description: &'static str,
}

pub static BUILTINS: &[BuiltinFn] = &[
    // ── Math ────────────────────────────────────────────────────
    BuiltinFn {
        name: "min", arity: Arity::AtLeast(1),
        category: "math", description: "Smallest of the arguments",
    },
    BuiltinFn {
        name: "max", arity: Arity::AtLeast(1),
        category: "math", description: "Largest of the arguments",
    },
    BuiltinFn {
        name: "floor", arity: Arity::Exact(1),
        category: "math", description: "Round down",
    },
    BuiltinFn {
        name: "ceil", arity: Arity::Exact(1),
        category: "math", description: "Round up",
    },
    BuiltinFn {
        name: "round", arity: Arity::Exact(1),
        category: "math", description: "Round to nearest",
    },
    BuiltinFn {
        name: "abs", arity: Arity::Exact(1),
        category: "math", description: "Absolute value",
    },
    // ── Random ──────────────────────────────────────────────────
    BuiltinFn {
        name: "random", arity: Arity::Range(0, 1),
        category: "random", description: "Uniform number in [0, 1), or an integer in [0, n) when given n",
    },
    BuiltinFn {
        name: "random_range", arity: Arity::Exact(2),
        category: "random", description: "Uniform number in [lo, hi)",
    },
    // ── Collections ─────────────────────────────────────────────
    BuiltinFn {
        name: "len", arity: Arity::Exact(1),
        category: "collection", description: "Number of elements in a list",
    },
    BuiltinFn {
        name: "list", arity: Arity::AtLeast(0),
        category: "collection", description: "Build a list from the arguments",
    },
    BuiltinFn {
        name: "get", arity: Arity::Exact(2),
        category: "collection", description: "Element of a list at an index",
    },
    // ── Entities ────────────────────────────────────────────────
    BuiltinFn {
        name: "entities_having", arity: Arity::Exact(1),
        category: "entity", description: "All entities carrying the named component",
    },
];

pub fn lookup_builtin(name: &str) -> Option<&'static BuiltinFn> {
    BUILTINS.iter().find(|b| b.name == name)
}

/// Categories in table order, each listed once.
pub fn categories() -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for builtin in BUILTINS {
        if !out.contains(&builtin.category) {
            out.push(builtin.category);
        }
    }
    out
}

pub fn builtins_in(category: &str) -> impl Iterator<Item = &'static BuiltinFn> + '_ {
    BUILTINS.iter().filter(move |b| b.category == category)
}
