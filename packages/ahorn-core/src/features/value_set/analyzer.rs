//! Forward interval analysis over a CFG arena

use rustc_hash::FxHashMap;

use crate::errors::Result;
use crate::features::flow_graph::{Cfg, Label, VertexKind};
use crate::shared::models::{
    BinaryOperator, Expression, Instruction, Section, UnaryOperator,
};

use super::interval::AbstractInterval;

/// Abstract value: an interval for integers, a pair of reachability
/// bits for booleans
#[derive(Debug, Clone, Copy, PartialEq)]
enum AbstractValue {
    Int(AbstractInterval),
    Bool { can_true: bool, can_false: bool },
}

impl AbstractValue {
    const TOP_BOOL: AbstractValue = AbstractValue::Bool {
        can_true: true,
        can_false: true,
    };

    fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (AbstractValue::Int(a), AbstractValue::Int(b)) => AbstractValue::Int(a.join(b)),
            (
                AbstractValue::Bool {
                    can_true: t1,
                    can_false: f1,
                },
                AbstractValue::Bool {
                    can_true: t2,
                    can_false: f2,
                },
            ) => AbstractValue::Bool {
                can_true: *t1 || *t2,
                can_false: *f1 || *f2,
            },
            _ => AbstractValue::Int(AbstractInterval::TOP),
        }
    }
}

/// Variable environment of one program point; absent variables are
/// unconstrained
type Env = FxHashMap<String, AbstractValue>;

fn join_env(into: &mut Env, other: &Env) -> bool {
    let mut changed = false;
    let keys: Vec<String> = into.keys().cloned().collect();
    for key in keys {
        match other.get(&key) {
            Some(value) => {
                let joined = into[&key].join(value);
                if joined != into[&key] {
                    into.insert(key, joined);
                    changed = true;
                }
            }
            None => {
                // unconstrained on the other path
                into.remove(&key);
                changed = true;
            }
        }
    }
    changed
}

/// Result of the value-set pre-pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueSetResult {
    pub unreachable_labels: Vec<Label>,
    /// (branch label, direction); `true` is the true branch
    pub unreachable_branches: Vec<(Label, bool)>,
}

pub struct Analyzer {
    /// widening kicks in after this many joins per label
    widening_threshold: usize,
}

impl Analyzer {
    pub fn new() -> Self {
        Self {
            widening_threshold: 3,
        }
    }

    /// Run the analysis on the program CFG and all callees
    pub fn analyze(&self, program: &Cfg) -> Result<ValueSetResult> {
        let mut result = ValueSetResult::default();
        let entry_env = initial_env(program);
        let mut analyzed = Vec::new();
        self.analyze_cfg(program, entry_env, &mut result, &mut analyzed, 0)?;
        result.unreachable_labels.sort_unstable();
        result.unreachable_labels.dedup();
        result.unreachable_branches.sort_unstable();
        result.unreachable_branches.dedup();
        Ok(result)
    }

    fn analyze_cfg(
        &self,
        cfg: &Cfg,
        entry_env: Env,
        result: &mut ValueSetResult,
        analyzed: &mut Vec<String>,
        depth: usize,
    ) -> Result<Env> {
        const MAX_CALL_DEPTH: usize = 16;
        if depth > MAX_CALL_DEPTH {
            return Ok(Env::default());
        }
        let first_analysis = !analyzed.contains(&cfg.name().to_string());
        if first_analysis {
            analyzed.push(cfg.name().to_string());
        }

        let mut env_in: FxHashMap<Label, Option<Env>> = FxHashMap::default();
        let mut join_counts: FxHashMap<Label, usize> = FxHashMap::default();
        for label in cfg.labels() {
            env_in.insert(label, None);
        }
        env_in.insert(cfg.entry_label(), Some(entry_env));

        let mut worklist: Vec<Label> = vec![cfg.entry_label()];
        while let Some(label) = worklist.pop() {
            let env = match env_in[&label].clone() {
                Some(env) => env,
                None => continue,
            };
            let vertex = cfg.vertex(label)?;

            // transfer through the vertex, one out-env per edge kind
            let outs: Vec<(Label, Env)> = match vertex.instruction() {
                Some(Instruction::If { condition, .. })
                | Some(Instruction::While { condition, .. }) => {
                    let value = eval(cfg, condition, &env);
                    let (can_true, can_false) = match value {
                        AbstractValue::Bool {
                            can_true,
                            can_false,
                        } => (can_true, can_false),
                        AbstractValue::Int(_) => (true, true),
                    };
                    let mut outs = Vec::new();
                    let true_target = cfg.true_edge(label)?.target;
                    let false_target = cfg.false_edge(label)?.target;
                    if can_true {
                        outs.push((true_target, refine(cfg, condition, &env, true)));
                    }
                    if can_false {
                        outs.push((false_target, refine(cfg, condition, &env, false)));
                    }
                    outs
                }
                Some(Instruction::Call { callee, .. }) => {
                    let callee_cfg = cfg.callee(label)?;
                    let prefix = format!("{}.", callee.path());
                    // map caller view of the instance onto the callee
                    // namespace, run top-down, map outputs back
                    let mut callee_env = Env::default();
                    for (name, value) in &env {
                        if let Some(stripped) = name.strip_prefix(&prefix) {
                            callee_env.insert(stripped.to_string(), *value);
                        }
                    }
                    let exit_env =
                        self.analyze_cfg(&callee_cfg, callee_env, result, analyzed, depth + 1)?;
                    let mut out = env.clone();
                    // instance state after the call
                    for variable in callee_cfg.flattened_interface() {
                        let caller_name = format!("{}{}", prefix, variable.path);
                        match exit_env.get(&variable.path) {
                            Some(value) => {
                                out.insert(caller_name, *value);
                            }
                            None => {
                                out.remove(&caller_name);
                            }
                        }
                    }
                    vec![(cfg.call_to_return_edge(label)?.target, out)]
                }
                Some(instruction) => {
                    let mut out = env.clone();
                    transfer(cfg, instruction, &mut out);
                    cfg.succeeding_labels(label)
                        .into_iter()
                        .map(|target| (target, out.clone()))
                        .collect()
                }
                None if vertex.kind() == VertexKind::Exit => Vec::new(),
                None => cfg
                    .succeeding_labels(label)
                    .into_iter()
                    .map(|target| (target, env.clone()))
                    .collect(),
            };

            for (target, out) in outs {
                let slot = env_in.get_mut(&target).expect("all labels seeded");
                match slot {
                    None => {
                        *slot = Some(out);
                        worklist.push(target);
                    }
                    Some(existing) => {
                        let count = join_counts.entry(target).or_insert(0);
                        *count += 1;
                        let widen = *count > self.widening_threshold;
                        let mut changed = join_env(existing, &out);
                        if widen && changed {
                            // widen integer entries that keep growing
                            for value in existing.values_mut() {
                                if let AbstractValue::Int(interval) = value {
                                    *value = AbstractValue::Int(
                                        interval.widen(&AbstractInterval::TOP),
                                    );
                                }
                            }
                            changed = true;
                        }
                        if changed {
                            worklist.push(target);
                        }
                    }
                }
            }
        }

        // fixpoint reached: collect unreachable labels and branches
        let mut unreachable_labels: Vec<Label> = Vec::new();
        let mut unreachable_branches: Vec<(Label, bool)> = Vec::new();
        for label in cfg.labels() {
            if env_in[&label].is_none() {
                unreachable_labels.push(label);
            }
        }
        for vertex in cfg.vertices() {
            let label = vertex.label();
            let env = match &env_in[&label] {
                Some(env) => env,
                None => continue,
            };
            if let Some(Instruction::If { condition, .. })
            | Some(Instruction::While { condition, .. }) = vertex.instruction()
            {
                if let AbstractValue::Bool {
                    can_true,
                    can_false,
                } = eval(cfg, condition, env)
                {
                    if !can_true {
                        unreachable_branches.push((label, true));
                    }
                    if !can_false {
                        unreachable_branches.push((label, false));
                    }
                }
            }
        }
        if first_analysis {
            result.unreachable_labels.extend(unreachable_labels);
            result.unreachable_branches.extend(unreachable_branches);
        } else {
            // later call contexts can only shrink the unreachable set
            // of this CFG
            let labels: Vec<Label> = cfg.labels().collect();
            result
                .unreachable_labels
                .retain(|l| !labels.contains(l) || unreachable_labels.contains(l));
            result
                .unreachable_branches
                .retain(|(l, d)| !labels.contains(l) || unreachable_branches.contains(&(*l, *d)));
        }

        Ok(env_in
            .remove(&cfg.exit_label())
            .flatten()
            .unwrap_or_default())
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Initial environment of the program: initialisation constants for
/// state variables, unconstrained inputs
fn initial_env(cfg: &Cfg) -> Env {
    let mut env = Env::default();
    for variable in cfg.flattened_interface() {
        if variable.section == Section::Input && variable.top_level {
            continue;
        }
        let value = match &variable.initialization {
            Some(constant) => match constant {
                crate::shared::models::Constant::Bool(b) => AbstractValue::Bool {
                    can_true: *b,
                    can_false: !*b,
                },
                crate::shared::models::Constant::Int(i)
                | crate::shared::models::Constant::Time(i) => {
                    AbstractValue::Int(AbstractInterval::constant(*i as i64))
                }
                crate::shared::models::Constant::Enumerated { ordinal, .. } => {
                    AbstractValue::Int(AbstractInterval::constant(*ordinal as i64))
                }
            },
            None => match &variable.data_type {
                crate::shared::models::DataType::Bool => AbstractValue::Bool {
                    can_true: false,
                    can_false: true,
                },
                _ => AbstractValue::Int(AbstractInterval::constant(0)),
            },
        };
        env.insert(variable.path.clone(), value);
    }
    env
}

fn transfer(cfg: &Cfg, instruction: &Instruction, env: &mut Env) {
    match instruction {
        Instruction::Assignment {
            variable,
            expression,
        } => {
            let value = eval(cfg, expression, env);
            env.insert(variable.path(), value);
        }
        Instruction::Havoc { variable } => {
            env.remove(&variable.path());
        }
        Instruction::Sequence(instructions) => {
            for instruction in instructions {
                transfer(cfg, instruction, env);
            }
        }
        _ => {}
    }
}

fn eval(cfg: &Cfg, expression: &Expression, env: &Env) -> AbstractValue {
    match expression {
        Expression::BooleanConstant(value) => AbstractValue::Bool {
            can_true: *value,
            can_false: !*value,
        },
        Expression::IntegerConstant(value) => {
            AbstractValue::Int(AbstractInterval::constant(*value as i64))
        }
        Expression::TimeConstant(value) => {
            AbstractValue::Int(AbstractInterval::constant(*value as i64))
        }
        Expression::EnumeratedValue { ordinal, .. } => {
            AbstractValue::Int(AbstractInterval::constant(*ordinal as i64))
        }
        Expression::Undefined | Expression::Nondeterministic => {
            AbstractValue::Int(AbstractInterval::TOP)
        }
        Expression::Access(reference) => {
            let name = reference.path();
            match env.get(&name) {
                Some(value) => *value,
                None => {
                    // unconstrained: pick the shape from the interface
                    let base = crate::features::ssa::ssa_base_name(&name);
                    match cfg.flattened_variable(base).map(|v| &v.data_type) {
                        Some(crate::shared::models::DataType::Bool) => AbstractValue::TOP_BOOL,
                        _ => AbstractValue::Int(AbstractInterval::TOP),
                    }
                }
            }
        }
        Expression::Unary { operator, operand } => match (operator, eval(cfg, operand, env)) {
            (
                UnaryOperator::Not,
                AbstractValue::Bool {
                    can_true,
                    can_false,
                },
            ) => AbstractValue::Bool {
                can_true: can_false,
                can_false: can_true,
            },
            (UnaryOperator::Negate, AbstractValue::Int(interval)) => {
                AbstractValue::Int(interval.neg())
            }
            _ => AbstractValue::TOP_BOOL,
        },
        Expression::Binary {
            operator,
            left,
            right,
        } => {
            let left = eval(cfg, left, env);
            let right = eval(cfg, right, env);
            eval_binary(*operator, left, right)
        }
        Expression::BooleanToInteger(operand) => match eval(cfg, operand, env) {
            AbstractValue::Bool {
                can_true,
                can_false,
            } => AbstractValue::Int(AbstractInterval::new(
                if can_false { 0 } else { 1 },
                if can_true { 1 } else { 0 },
            )),
            _ => AbstractValue::Int(AbstractInterval::new(0, 1)),
        },
        Expression::IntegerToBoolean(operand) => match eval(cfg, operand, env) {
            AbstractValue::Int(interval) => AbstractValue::Bool {
                can_true: !(interval.lo == 0 && interval.hi == 0),
                can_false: interval.contains(0),
            },
            _ => AbstractValue::TOP_BOOL,
        },
        Expression::Change { new, .. } => eval(cfg, new, env),
        Expression::Phi { operands, .. } => operands
            .iter()
            .map(|operand| eval(cfg, operand, env))
            .reduce(|a, b| a.join(&b))
            .unwrap_or(AbstractValue::Int(AbstractInterval::TOP)),
    }
}

fn eval_binary(
    operator: BinaryOperator,
    left: AbstractValue,
    right: AbstractValue,
) -> AbstractValue {
    use AbstractValue::{Bool, Int};
    match (operator, left, right) {
        (BinaryOperator::Add, Int(a), Int(b)) => Int(a.add(&b)),
        (BinaryOperator::Subtract, Int(a), Int(b)) => Int(a.sub(&b)),
        (BinaryOperator::Multiply, Int(a), Int(b)) => Int(a.mul(&b)),
        (BinaryOperator::Divide, Int(_), Int(_)) | (BinaryOperator::Modulo, Int(_), Int(_)) => {
            Int(AbstractInterval::TOP)
        }
        (
            BinaryOperator::And,
            Bool {
                can_true: t1,
                can_false: f1,
            },
            Bool {
                can_true: t2,
                can_false: f2,
            },
        ) => Bool {
            can_true: t1 && t2,
            can_false: f1 || f2,
        },
        (
            BinaryOperator::Or,
            Bool {
                can_true: t1,
                can_false: f1,
            },
            Bool {
                can_true: t2,
                can_false: f2,
            },
        ) => Bool {
            can_true: t1 || t2,
            can_false: f1 && f2,
        },
        (BinaryOperator::Xor, Bool { .. }, Bool { .. }) => AbstractValue::TOP_BOOL,
        (BinaryOperator::LessThan, Int(a), Int(b)) => Bool {
            can_true: a.lo < b.hi,
            can_false: a.hi >= b.lo,
        },
        (BinaryOperator::LessThanOrEqual, Int(a), Int(b)) => Bool {
            can_true: a.lo <= b.hi,
            can_false: a.hi > b.lo,
        },
        (BinaryOperator::GreaterThan, Int(a), Int(b)) => Bool {
            can_true: a.hi > b.lo,
            can_false: a.lo <= b.hi,
        },
        (BinaryOperator::GreaterThanOrEqual, Int(a), Int(b)) => Bool {
            can_true: a.hi >= b.lo,
            can_false: a.lo < b.hi,
        },
        (BinaryOperator::Equal, Int(a), Int(b)) => Bool {
            can_true: !a.meet(&b).is_empty(),
            can_false: a != b || a.lo != a.hi,
        },
        (BinaryOperator::NotEqual, Int(a), Int(b)) => Bool {
            can_true: a != b || a.lo != a.hi,
            can_false: !a.meet(&b).is_empty(),
        },
        (BinaryOperator::Equal, Bool { can_true: t1, can_false: f1 }, Bool { can_true: t2, can_false: f2 }) => {
            Bool {
                can_true: (t1 && t2) || (f1 && f2),
                can_false: (t1 && f2) || (f1 && t2),
            }
        }
        _ => AbstractValue::TOP_BOOL,
    }
}

/// Refine the environment under the assumption that `condition`
/// evaluates to `sense`; only simple `access <op> constant` shapes
/// are refined, anything else passes through
fn refine(cfg: &Cfg, condition: &Expression, env: &Env, sense: bool) -> Env {
    let mut refined = env.clone();
    match condition {
        Expression::Access(reference) => {
            refined.insert(
                reference.path(),
                AbstractValue::Bool {
                    can_true: sense,
                    can_false: !sense,
                },
            );
        }
        Expression::Unary {
            operator: UnaryOperator::Not,
            operand,
        } => return refine(cfg, operand, env, !sense),
        Expression::Binary {
            operator,
            left,
            right,
        } => {
            if let (Expression::Access(reference), Expression::IntegerConstant(constant)) =
                (left.as_ref(), right.as_ref())
            {
                let name = reference.path();
                let current = match env.get(&name) {
                    Some(AbstractValue::Int(interval)) => *interval,
                    _ => AbstractInterval::TOP,
                };
                let c = *constant as i64;
                let bound = match (operator, sense) {
                    (BinaryOperator::LessThan, true) => AbstractInterval::new(i32::MIN as i64, c - 1),
                    (BinaryOperator::LessThan, false) => AbstractInterval::new(c, i32::MAX as i64),
                    (BinaryOperator::LessThanOrEqual, true) => {
                        AbstractInterval::new(i32::MIN as i64, c)
                    }
                    (BinaryOperator::LessThanOrEqual, false) => {
                        AbstractInterval::new(c + 1, i32::MAX as i64)
                    }
                    (BinaryOperator::GreaterThan, true) => AbstractInterval::new(c + 1, i32::MAX as i64),
                    (BinaryOperator::GreaterThan, false) => {
                        AbstractInterval::new(i32::MIN as i64, c)
                    }
                    (BinaryOperator::GreaterThanOrEqual, true) => {
                        AbstractInterval::new(c, i32::MAX as i64)
                    }
                    (BinaryOperator::GreaterThanOrEqual, false) => {
                        AbstractInterval::new(i32::MIN as i64, c - 1)
                    }
                    (BinaryOperator::Equal, true) => AbstractInterval::constant(c),
                    (BinaryOperator::NotEqual, false) => AbstractInterval::constant(c),
                    _ => return refined,
                };
                refined.insert(name, AbstractValue::Int(current.meet(&bound)));
            }
        }
        _ => {}
    }
    refined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::flow_graph::Builder;
    use crate::shared::models::{
        DataType, Interface, Module, ModuleKind, Project, Variable,
    };

    #[test]
    fn test_infeasible_branch_is_reported() {
        // x := 1; if (x > 0) y := 2 else y := 3
        let interface = Interface::new(vec![
            Variable::new("x", DataType::Int, Section::Local),
            Variable::new("y", DataType::Int, Section::Local),
        ]);
        let body = vec![
            Instruction::assign("x", Expression::IntegerConstant(1)),
            Instruction::if_then_else(
                Expression::binary(
                    BinaryOperator::GreaterThan,
                    Expression::access("x"),
                    Expression::IntegerConstant(0),
                ),
                vec![Instruction::assign("y", Expression::IntegerConstant(2))],
                vec![Instruction::assign("y", Expression::IntegerConstant(3))],
            ),
        ];
        let project = Project::new(vec![Module::new(ModuleKind::Program, "P", interface, body)]);
        let cfg = Builder::new(&project).build().unwrap();
        let result = Analyzer::new().analyze(&cfg).unwrap();

        let if_label = cfg
            .vertices()
            .find(|v| matches!(v.instruction(), Some(Instruction::If { .. })))
            .unwrap()
            .label();
        let else_label = cfg.false_edge(if_label).unwrap().target;
        assert!(result.unreachable_branches.contains(&(if_label, false)));
        assert!(result.unreachable_labels.contains(&else_label));
    }

    #[test]
    fn test_input_driven_branches_stay_reachable() {
        let interface = Interface::new(vec![
            Variable::new("a", DataType::Int, Section::Input),
            Variable::new("y", DataType::Int, Section::Local),
        ]);
        let body = vec![Instruction::if_then_else(
            Expression::binary(
                BinaryOperator::LessThan,
                Expression::access("a"),
                Expression::IntegerConstant(0),
            ),
            vec![Instruction::assign("y", Expression::IntegerConstant(1))],
            vec![Instruction::assign("y", Expression::IntegerConstant(2))],
        )];
        let project = Project::new(vec![Module::new(ModuleKind::Program, "P", interface, body)]);
        let cfg = Builder::new(&project).build().unwrap();
        let result = Analyzer::new().analyze(&cfg).unwrap();
        assert!(result.unreachable_branches.is_empty());
        assert!(result.unreachable_labels.is_empty());
    }
}
