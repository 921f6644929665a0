//! Document nodes the policy compiler (C6) consumes (spec §6 "Document
//! surface (parser collaborator)").

use pdp_eval::Expr;
use pdp_functions::Import;

/// What a policy grants when its target matches and its body is decisive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entitlement {
    Permit,
    Deny,
}

/// A policy-set's combining algorithm (spec §4.7's table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombiningAlgorithm {
    DenyOverrides,
    PermitOverrides,
    DenyUnlessPermit,
    PermitUnlessDeny,
    FirstApplicable,
    OnlyOneApplicable,
    Unanimous { strict: bool },
    Unique,
}

impl CombiningAlgorithm {
    /// Parse a PDP configuration's textual algorithm name. `PdpConfig`
    /// stores `top_level_algorithm` as a plain `String` to avoid a
    /// dependency cycle with this crate; the orchestrator parses it back
    /// through here.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "deny-overrides" => Self::DenyOverrides,
            "permit-overrides" => Self::PermitOverrides,
            "deny-unless-permit" => Self::DenyUnlessPermit,
            "permit-unless-deny" => Self::PermitUnlessDeny,
            "first-applicable" => Self::FirstApplicable,
            "only-one-applicable" => Self::OnlyOneApplicable,
            "unanimous" => Self::Unanimous { strict: false },
            "unanimous-strict" => Self::Unanimous { strict: true },
            "unique" => Self::Unique,
            _ => return None,
        })
    }
}

/// A set's declared fallback when every member is `NOT_APPLICABLE`
/// (spec §4.7 "Default vote"; default `Abstain`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefaultVote {
    Permit,
    Deny,
    #[default]
    Abstain,
}

/// Whether a set's combined `INDETERMINATE` propagates or is demoted to
/// `NOT_APPLICABLE` (spec §4.7 "Error-handling mode"; default `Propagate`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorsMode {
    #[default]
    Propagate,
    Abstain,
}

/// A single policy: a target, an entitlement, a where-body, and the
/// constraint clauses it contributes when decisive (spec §6's `Policy`
/// node).
#[derive(Debug, Clone)]
pub struct PolicyDoc {
    pub name: String,
    pub target: Expr,
    pub entitlement: Entitlement,
    pub where_body: Expr,
    pub obligations: Vec<Expr>,
    pub advice: Vec<Expr>,
    /// `|- ...` applied to the subscription resource, if declared.
    pub transform: Option<Expr>,
    pub imports: Vec<Import>,
}

/// A policy set: a target, a combining algorithm over its members, and
/// set-scoped variable bindings (spec §6's `PolicySet` node).
#[derive(Debug, Clone)]
pub struct PolicySetDoc {
    pub name: String,
    pub target: Expr,
    pub algorithm: CombiningAlgorithm,
    pub default_vote: DefaultVote,
    pub errors_mode: ErrorsMode,
    /// `var name = expr;` bindings in declaration order; later bindings
    /// may reference earlier ones (spec §4.6 step 4).
    pub variables: Vec<(String, Expr)>,
    pub members: Vec<Document>,
    pub imports: Vec<Import>,
}

/// Either kind of document a policy repository may hand the compiler.
#[derive(Debug, Clone)]
pub enum Document {
    Policy(PolicyDoc),
    PolicySet(PolicySetDoc),
}

impl Document {
    pub fn name(&self) -> &str {
        match self {
            Document::Policy(p) => &p.name,
            Document::PolicySet(s) => &s.name,
        }
    }
}
