//! Shared helpers for the integration tests: programmatic IR
//! projects and a small exploration harness wiring executor,
//! explorer, and merger the way the engines do.

use ahorn_core::config::Configuration;
use ahorn_core::features::flow_graph::{Builder, CfgRef};
use ahorn_core::features::lowering::CallTransformationPass;
use ahorn_core::features::smt::SmtContext;
use ahorn_core::features::symbolic_execution::{Context, Executor, Explorer, Merger};
use ahorn_core::shared::models::{
    BinaryOperator, CallArguments, DataType, Expression, Instruction, Interface, Module,
    ModuleKind, Project, Section, UnaryOperator, Variable, VariableReference,
};

pub fn build(project: &Project) -> CfgRef {
    Builder::new(project).build().expect("project builds")
}

/// S1: `x := 1; if (x > 0) y := 2 else y := 3; z := y + x`
pub fn constant_propagation_project() -> Project {
    let interface = Interface::new(vec![
        Variable::new("x", DataType::Int, Section::Local),
        Variable::new("y", DataType::Int, Section::Local),
        Variable::new("z", DataType::Int, Section::Output),
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
        Instruction::assign(
            "z",
            Expression::binary(
                BinaryOperator::Add,
                Expression::access("y"),
                Expression::access("x"),
            ),
        ),
    ];
    Project::new(vec![Module::new(ModuleKind::Program, "P", interface, body)])
}

/// S5: `if (a) y := 1 else y := 2; z := y`
pub fn merge_at_join_project() -> Project {
    let interface = Interface::new(vec![
        Variable::new("a", DataType::Bool, Section::Input),
        Variable::new("y", DataType::Int, Section::Local),
        Variable::new("z", DataType::Int, Section::Output),
    ]);
    let body = vec![
        Instruction::if_then_else(
            Expression::access("a"),
            vec![Instruction::assign("y", Expression::IntegerConstant(1))],
            vec![Instruction::assign("y", Expression::IntegerConstant(2))],
        ),
        Instruction::assign("z", Expression::access("y")),
    ];
    Project::new(vec![Module::new(ModuleKind::Program, "P", interface, body)])
}

/// S6: `havoc(x); if (x > 0) p := true else p := false`
pub fn havoc_project() -> Project {
    let interface = Interface::new(vec![
        Variable::new("x", DataType::Int, Section::Local),
        Variable::new("p", DataType::Bool, Section::Output),
    ]);
    let body = vec![
        Instruction::Havoc {
            variable: VariableReference::Variable("x".to_string()),
        },
        Instruction::if_then_else(
            Expression::binary(
                BinaryOperator::GreaterThan,
                Expression::access("x"),
                Expression::IntegerConstant(0),
            ),
            vec![Instruction::assign("p", Expression::BooleanConstant(true))],
            vec![Instruction::assign("p", Expression::BooleanConstant(false))],
        ),
    ];
    Project::new(vec![Module::new(ModuleKind::Program, "P", interface, body)])
}

/// S3: antivalent function block, `q = a and not b`
pub fn antivalent_project() -> Project {
    let fb = Module::new(
        ModuleKind::FunctionBlock,
        "Antivalent",
        Interface::new(vec![
            Variable::new("a", DataType::Bool, Section::Input),
            Variable::new("b", DataType::Bool, Section::Input),
            Variable::new("q", DataType::Bool, Section::Output),
            Variable::new("t", DataType::Time, Section::Local),
        ]),
        vec![Instruction::if_then_else(
            Expression::binary(
                BinaryOperator::And,
                Expression::access("a"),
                Expression::unary(UnaryOperator::Not, Expression::access("b")),
            ),
            vec![
                Instruction::assign("q", Expression::BooleanConstant(true)),
                Instruction::assign(
                    "t",
                    Expression::binary(
                        BinaryOperator::Add,
                        Expression::access("t"),
                        Expression::TimeConstant(100),
                    ),
                ),
            ],
            vec![
                Instruction::assign("q", Expression::BooleanConstant(false)),
                Instruction::assign("t", Expression::TimeConstant(0)),
            ],
        )],
    );
    let program = Module::new(
        ModuleKind::Program,
        "P",
        Interface::new(vec![
            Variable::new("a", DataType::Bool, Section::Input),
            Variable::new("b", DataType::Bool, Section::Input),
            Variable::new("q", DataType::Bool, Section::Output),
            Variable::new(
                "fb",
                DataType::Derived {
                    type_name: "Antivalent".to_string(),
                },
                Section::Local,
            ),
        ]),
        vec![Instruction::Call {
            callee: VariableReference::Variable("fb".to_string()),
            arguments: CallArguments {
                inputs: vec![
                    ("a".to_string(), Expression::access("a")),
                    ("b".to_string(), Expression::access("b")),
                ],
                outputs: vec![(
                    "q".to_string(),
                    VariableReference::Variable("q".to_string()),
                )],
            },
        }],
    );
    Project::new(vec![fb, program])
}

/// S4: `inc(x) = x + 1` called twice in one cycle
pub fn summary_reuse_project() -> Project {
    let inc = Module::new(
        ModuleKind::FunctionBlock,
        "Inc",
        Interface::new(vec![
            Variable::new("x", DataType::Int, Section::Input),
            Variable::new("y", DataType::Int, Section::Output),
        ]),
        vec![Instruction::assign(
            "y",
            Expression::binary(
                BinaryOperator::Add,
                Expression::access("x"),
                Expression::IntegerConstant(1),
            ),
        )],
    );
    let program = Module::new(
        ModuleKind::Program,
        "P",
        Interface::new(vec![
            Variable::new("r1", DataType::Int, Section::Output),
            Variable::new("r2", DataType::Int, Section::Output),
            Variable::new(
                "i1",
                DataType::Derived {
                    type_name: "Inc".to_string(),
                },
                Section::Local,
            ),
            Variable::new(
                "i2",
                DataType::Derived {
                    type_name: "Inc".to_string(),
                },
                Section::Local,
            ),
        ]),
        vec![
            Instruction::Call {
                callee: VariableReference::Variable("i1".to_string()),
                arguments: CallArguments {
                    inputs: vec![("x".to_string(), Expression::IntegerConstant(0))],
                    outputs: vec![(
                        "y".to_string(),
                        VariableReference::Variable("r1".to_string()),
                    )],
                },
            },
            Instruction::Call {
                callee: VariableReference::Variable("i2".to_string()),
                arguments: CallArguments {
                    inputs: vec![("x".to_string(), Expression::access("r1"))],
                    outputs: vec![(
                        "y".to_string(),
                        VariableReference::Variable("r2".to_string()),
                    )],
                },
            },
        ],
    );
    Project::new(vec![inc, program])
}

/// S2: the Kuchta et al. toy with a change annotation on the branch
pub fn kuchta_toy_project() -> Project {
    let interface = Interface::new(vec![
        Variable::new("a", DataType::Int, Section::Input),
        Variable::new("x", DataType::Int, Section::Output),
    ]);
    let condition = Expression::change(
        Expression::binary(
            BinaryOperator::LessThan,
            Expression::access("a"),
            Expression::IntegerConstant(0),
        ),
        Expression::binary(
            BinaryOperator::LessThanOrEqual,
            Expression::access("a"),
            Expression::IntegerConstant(0),
        ),
    );
    let body = vec![Instruction::if_then_else(
        condition,
        vec![Instruction::assign("x", Expression::IntegerConstant(0))],
        vec![Instruction::assign("x", Expression::IntegerConstant(1))],
    )];
    Project::new(vec![Module::new(ModuleKind::Program, "P", interface, body)])
}

/// The exploration loop of the engines, returning every context that
/// completed `cycles` cycles together with the harness state
pub struct Harness {
    pub smt: SmtContext,
    pub executor: Executor,
    pub cfg: CfgRef,
    pub finished: Vec<Context>,
}

pub fn explore(cfg: &CfgRef, config: &Configuration, cycles: u32) -> Harness {
    explore_with(cfg, config, cycles, true)
}

pub fn explore_with(cfg: &CfgRef, config: &Configuration, cycles: u32, merging: bool) -> Harness {
    let cfg = CallTransformationPass::new()
        .apply(cfg)
        .expect("call transformation applies");
    let mut smt = SmtContext::new(config.rng_seed);
    let mut executor = Executor::new(config.summarization);
    let mut explorer = Explorer::new(config.exploration_heuristic);
    explorer.initialize(&cfg, &[], &[]);
    let mut merger = Merger::new(config.merge_strategy);
    merger.initialize(&cfg);
    let initial = executor.initial_context(&mut smt, config, &cfg);
    explorer.push(initial);

    let mut finished = Vec::new();
    let mut steps = 0usize;
    loop {
        steps += 1;
        assert!(steps < 100_000, "exploration did not terminate");
        let context = match explorer.pop() {
            Some(context) => {
                if merging && merger.reached_merge_point(&context) {
                    merger.push(context);
                    continue;
                }
                context
            }
            None => match merger
                .merge(&mut smt, &mut executor)
                .expect("merge succeeds")
            {
                Some(context) => context,
                None => break,
            },
        };
        let execution = executor
            .execute(&mut smt, config, context)
            .expect("execution succeeds");
        for successor in execution.contexts {
            if successor.cycle() >= cycles {
                finished.push(successor);
            } else {
                explorer.push(successor);
            }
        }
    }
    Harness {
        smt,
        executor,
        cfg,
        finished,
    }
}
