//! A solver-agnostic linear program.
//!
//! Models are built into a [`LinearProgram`] value: a list of bounded continuous variables,
//! a list of named linear constraints and a linear objective that is always minimized.
//! Solver backends translate this value into their own representation.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    ops::{Add, AddAssign, Mul, Neg, Range, Sub, SubAssign},
};

use derive_more::{Deref, Display, From, Into};
use itertools::Itertools;
use typed_index_collections::{TiSlice, TiVec};

/// Index of a variable in the linear program it was created by.
#[derive(Deref, Debug, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash)]
pub struct VarId(usize);

#[derive(Debug, Display, Clone, PartialEq)]
pub enum LpError {
    #[display(fmt = "a variable named '{}' already exists", _0)]
    DuplicateVariable(String),
    #[display(fmt = "a constraint named '{}' already exists", _0)]
    DuplicateConstraint(String),
    #[display(
        fmt = "variable '{}' has invalid bounds [{}, {}]",
        name,
        lower,
        upper
    )]
    InvalidBounds { name: String, lower: f64, upper: f64 },
    #[display(fmt = "'{}' refers to variable {} which does not exist", name, var)]
    UnknownVariable { name: String, var: usize },
    #[display(fmt = "'{}' has a non-finite coefficient", _0)]
    NonFiniteCoefficient(String),
}

impl std::error::Error for LpError {}

/// A continuous decision variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    name: String,
    lower: f64,
    upper: f64,
}

impl Variable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    /// The upper bound, `f64::INFINITY` when unbounded
    pub fn upper(&self) -> f64 {
        self.upper
    }
}

/// An affine expression `Σ coeff·var + constant`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    terms: Vec<(VarId, f64)>,
    constant: f64,
}

impl LinExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_constant(constant: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant,
        }
    }

    pub fn add_term(&mut self, coeff: f64, var: VarId) -> &mut Self {
        self.terms.push((var, coeff));
        self
    }

    pub fn add_constant(&mut self, constant: f64) -> &mut Self {
        self.constant += constant;
        self
    }

    /// The (possibly repeated) terms of the expression, in insertion order
    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    /// The total coefficient of `var`
    pub fn coefficient(&self, var: VarId) -> f64 {
        self.terms
            .iter()
            .filter(|(v, _)| *v == var)
            .map(|(_, c)| c)
            .sum()
    }

    /// Merges repeated variables and drops zero coefficients. Terms end up sorted on variable.
    pub fn compact(mut self) -> Self {
        self.terms.sort_by_key(|(var, _)| *var);
        self.terms = self
            .terms
            .into_iter()
            .coalesce(|(a, x), (b, y)| {
                if a == b {
                    Ok((a, x + y))
                } else {
                    Err(((a, x), (b, y)))
                }
            })
            .filter(|(_, coeff)| *coeff != 0.0)
            .collect();
        self
    }

    /// Evaluates the expression for the given variable values
    pub fn eval(&self, values: &TiSlice<VarId, f64>) -> f64 {
        self.terms
            .iter()
            .map(|(var, coeff)| coeff * values[*var])
            .sum::<f64>()
            + self.constant
    }
}

impl From<VarId> for LinExpr {
    fn from(var: VarId) -> Self {
        (1.0, var).into()
    }
}

impl From<(f64, VarId)> for LinExpr {
    fn from((coeff, var): (f64, VarId)) -> Self {
        Self {
            terms: vec![(var, coeff)],
            constant: 0.0,
        }
    }
}

impl From<f64> for LinExpr {
    fn from(constant: f64) -> Self {
        Self::from_constant(constant)
    }
}

impl<T: Into<LinExpr>> AddAssign<T> for LinExpr {
    fn add_assign(&mut self, rhs: T) {
        let rhs = rhs.into();
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
    }
}

impl<T: Into<LinExpr>> SubAssign<T> for LinExpr {
    fn sub_assign(&mut self, rhs: T) {
        let rhs: LinExpr = rhs.into();
        *self += -rhs;
    }
}

impl<T: Into<LinExpr>> Add<T> for LinExpr {
    type Output = LinExpr;

    fn add(mut self, rhs: T) -> Self::Output {
        self += rhs;
        self
    }
}

impl<T: Into<LinExpr>> Sub<T> for LinExpr {
    type Output = LinExpr;

    fn sub(mut self, rhs: T) -> Self::Output {
        self -= rhs;
        self
    }
}

impl Add<f64> for VarId {
    type Output = LinExpr;

    fn add(self, rhs: f64) -> Self::Output {
        LinExpr::from(self) + rhs
    }
}

impl Mul<f64> for LinExpr {
    type Output = LinExpr;

    fn mul(mut self, rhs: f64) -> Self::Output {
        for (_, coeff) in &mut self.terms {
            *coeff *= rhs;
        }
        self.constant *= rhs;
        self
    }
}

impl Mul<VarId> for f64 {
    type Output = LinExpr;

    fn mul(self, rhs: VarId) -> Self::Output {
        (self, rhs).into()
    }
}

impl Neg for LinExpr {
    type Output = LinExpr;

    fn neg(self) -> Self::Output {
        self * -1.0
    }
}

/// Sums an iterator of expression-like items, analogous to `grb_sum`
pub trait LinSum {
    fn lin_sum(self) -> LinExpr;
}

impl<I> LinSum for I
where
    I: Iterator,
    I::Item: Into<LinExpr>,
{
    fn lin_sum(self) -> LinExpr {
        let mut sum = LinExpr::new();
        for item in self {
            sum += item;
        }
        sum
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintSense {
    #[display(fmt = "<=")]
    Le,
    #[display(fmt = "=")]
    Eq,
    #[display(fmt = ">=")]
    Ge,
}

/// `lhs <sense> rhs` before normalization
#[derive(Debug, Clone)]
pub struct ConstraintExpr {
    lhs: LinExpr,
    sense: ConstraintSense,
    rhs: LinExpr,
}

pub fn leq(lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) -> ConstraintExpr {
    ConstraintExpr {
        lhs: lhs.into(),
        sense: ConstraintSense::Le,
        rhs: rhs.into(),
    }
}

pub fn eq(lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) -> ConstraintExpr {
    ConstraintExpr {
        lhs: lhs.into(),
        sense: ConstraintSense::Eq,
        rhs: rhs.into(),
    }
}

pub fn geq(lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) -> ConstraintExpr {
    ConstraintExpr {
        lhs: lhs.into(),
        sense: ConstraintSense::Ge,
        rhs: rhs.into(),
    }
}

/// A named linear constraint with every variable on the left-hand side and the constant on
/// the right-hand side.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    name: String,
    lhs: LinExpr,
    sense: ConstraintSense,
    rhs: f64,
}

impl Constraint {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Variable terms only; the constant is always zero
    pub fn lhs(&self) -> &LinExpr {
        &self.lhs
    }

    pub fn sense(&self) -> ConstraintSense {
        self.sense
    }

    pub fn rhs(&self) -> f64 {
        self.rhs
    }

    /// How much the constraint is violated by, zero if it holds
    pub fn violation(&self, values: &TiSlice<VarId, f64>) -> f64 {
        let lhs = self.lhs.eval(values);
        match self.sense {
            ConstraintSense::Le => (lhs - self.rhs).max(0.0),
            ConstraintSense::Ge => (self.rhs - lhs).max(0.0),
            ConstraintSense::Eq => (lhs - self.rhs).abs(),
        }
    }
}

/// A bound or constraint that does not hold for a value vector
#[derive(Debug, Display, Clone, PartialEq)]
pub enum Violation {
    #[display(
        fmt = "{} = {} is outside of [{}, {}]",
        name,
        value,
        lower,
        upper
    )]
    Bound {
        name: String,
        value: f64,
        lower: f64,
        upper: f64,
    },
    #[display(fmt = "constraint {} is violated by {}", name, amount)]
    Constraint { name: String, amount: f64 },
}

/// A minimization problem over continuous variables
#[derive(Debug, Clone, Default)]
pub struct LinearProgram {
    name: String,
    variables: TiVec<VarId, Variable>,
    variable_names: HashMap<String, VarId>,
    constraints: Vec<Constraint>,
    constraint_names: HashSet<String>,
    objective: LinExpr,
}

impl LinearProgram {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a continuous variable with the given bounds. Names must be unique.
    pub fn add_var(&mut self, name: &str, bounds: &Range<f64>) -> Result<VarId, LpError> {
        let (lower, upper) = (bounds.start, bounds.end);
        if lower.is_nan() || upper.is_nan() || lower > upper || lower == f64::INFINITY {
            return Err(LpError::InvalidBounds {
                name: name.to_string(),
                lower,
                upper,
            });
        }

        if self.variable_names.contains_key(name) {
            return Err(LpError::DuplicateVariable(name.to_string()));
        }

        let id = VarId(self.variables.len());
        self.variables.push(Variable {
            name: name.to_string(),
            lower,
            upper,
        });
        self.variable_names.insert(name.to_string(), id);

        Ok(id)
    }

    /// Adds a named constraint, moving every variable to the left and the constant to the right.
    pub fn add_constr(&mut self, name: &str, constr: ConstraintExpr) -> Result<(), LpError> {
        if self.constraint_names.contains(name) {
            return Err(LpError::DuplicateConstraint(name.to_string()));
        }

        let ConstraintExpr { lhs, sense, rhs } = constr;
        let mut lhs = (lhs - rhs).compact();
        self.check(name, &lhs)?;

        let rhs = -lhs.constant;
        lhs.constant = 0.0;

        self.constraints.push(Constraint {
            name: name.to_string(),
            lhs,
            sense,
            rhs,
        });
        self.constraint_names.insert(name.to_string());

        Ok(())
    }

    /// Replaces the objective. The objective is always minimized.
    pub fn set_objective(&mut self, objective: impl Into<LinExpr>) -> Result<(), LpError> {
        let objective = objective.into().compact();
        self.check("objective", &objective)?;
        self.objective = objective;
        Ok(())
    }

    fn check(&self, name: &str, expr: &LinExpr) -> Result<(), LpError> {
        if !expr.constant.is_finite() {
            return Err(LpError::NonFiniteCoefficient(name.to_string()));
        }
        for (var, coeff) in &expr.terms {
            if **var >= self.variables.len() {
                return Err(LpError::UnknownVariable {
                    name: name.to_string(),
                    var: **var,
                });
            }
            if !coeff.is_finite() {
                return Err(LpError::NonFiniteCoefficient(name.to_string()));
            }
        }
        Ok(())
    }

    pub fn variables(&self) -> &TiSlice<VarId, Variable> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<VarId> {
        self.variable_names.get(name).copied()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn constraint(&self, name: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.name == name)
    }

    pub fn objective(&self) -> &LinExpr {
        &self.objective
    }

    /// Every bound and constraint violated by more than `tolerance`
    pub fn violations(&self, values: &TiSlice<VarId, f64>, tolerance: f64) -> Vec<Violation> {
        let bounds = self
            .variables
            .iter_enumerated()
            .filter(|(id, var)| {
                values[*id] < var.lower - tolerance || values[*id] > var.upper + tolerance
            })
            .map(|(id, var)| Violation::Bound {
                name: var.name.clone(),
                value: values[id],
                lower: var.lower,
                upper: var.upper,
            });

        let constraints = self
            .constraints
            .iter()
            .map(|c| (c, c.violation(values)))
            .filter(|(_, amount)| *amount > tolerance)
            .map(|(c, amount)| Violation::Constraint {
                name: c.name.clone(),
                amount,
            });

        bounds.chain(constraints).collect()
    }

    fn write_expr(&self, f: &mut fmt::Formatter<'_>, expr: &LinExpr) -> fmt::Result {
        if expr.terms.is_empty() {
            return write!(f, "0");
        }
        for (i, (var, coeff)) in expr.terms.iter().enumerate() {
            let name = lp_name(&self.variables[*var].name);
            match (i, *coeff < 0.0) {
                (0, false) => write!(f, "{} {}", coeff, name)?,
                (0, true) => write!(f, "- {} {}", -coeff, name)?,
                (_, false) => write!(f, " + {} {}", coeff, name)?,
                (_, true) => write!(f, " - {} {}", -coeff, name)?,
            }
        }
        Ok(())
    }
}

/// Maps a name onto the characters the LP file format accepts in names
fn lp_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '[' => '(',
            ']' => ')',
            ':' | '+' | '-' | '*' | '^' | '<' | '>' | '=' | '\\' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Renders the program in CPLEX LP format
impl fmt::Display for LinearProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\\ Problem: {}", self.name)?;
        writeln!(f, "Minimize")?;
        write!(f, " obj: ")?;
        self.write_expr(f, &self.objective)?;
        match self.objective.constant {
            c if c > 0.0 => write!(f, " + {}", c)?,
            c if c < 0.0 => write!(f, " - {}", -c)?,
            _ => (),
        }
        writeln!(f)?;

        writeln!(f, "Subject To")?;
        for c in &self.constraints {
            write!(f, " {}: ", lp_name(&c.name))?;
            self.write_expr(f, &c.lhs)?;
            writeln!(f, " {} {}", c.sense, c.rhs)?;
        }

        writeln!(f, "Bounds")?;
        for var in &self.variables {
            let name = lp_name(&var.name);
            match (var.lower == 0.0, var.upper.is_finite()) {
                (true, false) => (),
                (_, true) => writeln!(f, " {} <= {} <= {}", var.lower, name, var.upper)?,
                (false, false) if var.lower == f64::NEG_INFINITY => writeln!(f, " {} free", name)?,
                (false, false) => writeln!(f, " {} >= {}", name, var.lower)?,
            }
        }

        writeln!(f, "End")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unbounded() -> Range<f64> {
        0.0..f64::INFINITY
    }

    #[test]
    fn constraints_are_normalized() {
        let mut lp = LinearProgram::new("test");
        let x = lp.add_var("x", &unbounded()).unwrap();
        let y = lp.add_var("y", &unbounded()).unwrap();

        // x + 2 == y + 5 - x  <=>  2x - y == 3
        lp.add_constr("c", eq(x + 2.0, LinExpr::from(y) + 5.0 - x))
            .unwrap();

        let c = lp.constraint("c").unwrap();
        assert_eq!(c.lhs().terms(), &[(x, 2.0), (y, -1.0)]);
        assert_eq!(c.sense(), ConstraintSense::Eq);
        assert_eq!(c.rhs(), 3.0);
        assert_eq!(c.lhs().constant(), 0.0);
    }

    #[test]
    fn compact_merges_and_drops_zero_terms() {
        let x = VarId(0);
        let y = VarId(1);
        let expr = (LinExpr::from(y) + x + 2.0 * x - y).compact();
        assert_eq!(expr.terms(), &[(x, 3.0)]);
    }

    #[test]
    fn lin_sum_over_terms() {
        let expr = (0..3)
            .map(|i| (i as f64, VarId(i)))
            .lin_sum()
            .compact();
        assert_eq!(expr.terms(), &[(VarId(1), 1.0), (VarId(2), 2.0)]);
        assert_eq!(expr.coefficient(VarId(2)), 2.0);
        assert_eq!(expr.coefficient(VarId(0)), 0.0);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut lp = LinearProgram::new("test");
        let x = lp.add_var("x", &unbounded()).unwrap();
        assert_eq!(
            lp.add_var("x", &unbounded()),
            Err(LpError::DuplicateVariable("x".to_string()))
        );

        lp.add_constr("c", leq(x, 1.0)).unwrap();
        assert_eq!(
            lp.add_constr("c", geq(x, 0.0)),
            Err(LpError::DuplicateConstraint("c".to_string()))
        );
    }

    #[test]
    fn invalid_bounds_and_foreign_variables_are_rejected() {
        let mut lp = LinearProgram::new("test");
        assert!(matches!(
            lp.add_var("x", &(1.0..0.0)),
            Err(LpError::InvalidBounds { .. })
        ));
        assert!(matches!(
            lp.add_constr("c", leq(VarId(3), 1.0)),
            Err(LpError::UnknownVariable { var: 3, .. })
        ));
        let x = lp.add_var("x", &unbounded()).unwrap();
        assert!(matches!(
            lp.set_objective(f64::NAN * x),
            Err(LpError::NonFiniteCoefficient(_))
        ));
    }

    #[test]
    fn violations_report_bounds_and_constraints() {
        let mut lp = LinearProgram::new("test");
        let x = lp.add_var("x", &(0.0..4.0)).unwrap();
        let y = lp.add_var("y", &unbounded()).unwrap();
        lp.add_constr("sum", leq(LinExpr::from(x) + y, 5.0)).unwrap();

        let ok: TiVec<VarId, f64> = vec![2.0, 3.0].into();
        assert!(lp.violations(&ok, 1e-9).is_empty());

        let bad: TiVec<VarId, f64> = vec![4.5, 1.0].into();
        let violations = lp.violations(&bad, 1e-9);
        assert_eq!(violations.len(), 2);
        assert!(matches!(&violations[0], Violation::Bound { name, .. } if name == "x"));
        assert!(
            matches!(&violations[1], Violation::Constraint { name, amount } if name == "sum" && (*amount - 0.5).abs() < 1e-12)
        );
    }

    #[test]
    fn renders_lp_format() {
        let mut lp = LinearProgram::new("small");
        let x = lp.add_var("produce[A,1]", &unbounded()).unwrap();
        let e = lp.add_var("extra[R,1]", &(0.0..2.0)).unwrap();
        lp.add_constr("resource[R,1]", leq(x, LinExpr::from(e) + 10.0))
            .unwrap();
        lp.set_objective(1.5 * x + 2.0 * e).unwrap();

        let text = lp.to_string();
        assert!(text.contains("Minimize\n obj: 1.5 produce(A,1) + 2 extra(R,1)\n"));
        assert!(text.contains(" resource(R,1): 1 produce(A,1) - 1 extra(R,1) <= 10\n"));
        assert!(text.contains(" 0 <= extra(R,1) <= 2\n"));
        assert!(!text.contains("<= produce"));
        assert!(text.ends_with("End\n"));
    }

    #[test]
    fn lp_names_are_sanitized() {
        assert_eq!(lp_name("produce[Tomato paste,1]"), "produce(Tomato_paste,1)");
        assert_eq!(lp_name("extra[a:b+c-d,2]"), "extra(a_b_c_d,2)");
        assert_eq!(lp_name("storage[x<=y\tz,3,G]"), "storage(x__y_z,3,G)");
    }

    #[test]
    fn renders_signs_bounds_and_senses() {
        let mut lp = LinearProgram::new("signs");
        let x = lp.add_var("x", &(-1.0..f64::INFINITY)).unwrap();
        let y = lp.add_var("y", &(f64::NEG_INFINITY..f64::INFINITY)).unwrap();
        let z = lp.add_var("z", &(2.0..5.0)).unwrap();
        lp.add_constr("lower", geq(LinExpr::from(x) - y, 1.0)).unwrap();
        lp.add_constr("fixed", eq(z, 3.0)).unwrap();
        lp.set_objective(LinExpr::from(x) + z - 4.0).unwrap();

        let text = lp.to_string();
        assert!(text.contains(" obj: 1 x + 1 z - 4\n"));
        assert!(text.contains(" lower: 1 x - 1 y >= 1\n"));
        assert!(text.contains(" fixed: 1 z = 3\n"));
        assert!(text.contains(" x >= -1\n"));
        assert!(text.contains(" y free\n"));
        assert!(text.contains(" 2 <= z <= 5\n"));
    }
}
