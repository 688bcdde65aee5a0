//! Grammar fixtures for integration tests.

/// Right-associative assignment, translated without precedence markers.
/// Building it reports one shift/reduce conflict on the `"="` literal.
pub const ASSIGN: &str = "\
@top Program { expr }

expr { expr \"=\" expr | Number }

@tokens {
  Number { $[0-9]+ }
}
";

/// Same grammar, but with an existing precedence block to append to.
pub const ASSIGN_WITH_PRECEDENCES: &str = "\
@precedence {
  mul @left
}

@top Program { expr }

expr { expr \"=\" expr | Number }

@tokens {
  Number { $[0-9]+ }
}
";

/// A grammar whose build never reports conflicts.
pub const CLEAN: &str = "\
@top Program { Number }

@tokens {
  Number { $[0-9]+ }
}
";
