//! End-to-end lowering tests.
//!
//! Each test builds a source tree in code, lowers it with
//! `chipflow_lower::lower()`, and checks the shape of the resulting graph:
//! which nodes exist, how exec flow is wired between them, and which data
//! ports feed which inputs.
//!
//! Tests cover:
//! - If elision and branch wiring
//! - Promotion of locals written inside branches and loops
//! - Switch section de-duplication and `goto case`
//! - Forward goto resolution and unresolved gotos
//! - Return collection across inlined calls
//! - While, do-while and foreach loops with break/continue
//! - Deferred continuations flagging manual iterators
//! - Event functions, shared properties and sub-boards
//! - String interpolation
//! - Fatal errors

use chipflow_core::{Context, Literal, NodeId, Port};
use chipflow_lower::source::{
    Block, Expr, ExprKind, GotoTarget, InterpolationPart, MethodDecl, ParamDecl, PredefinedType,
    SourceTree, Span, Stmt, StmtKind, SwitchLabel, SwitchSection, TupleElement, TypeRef,
};
use chipflow_lower::{lower, lower_with, LowerOptions, LoweringError, TableOracle};
use serde_json::json;

// ---------------------------------------------------------------------------
// Tree builders
// ---------------------------------------------------------------------------

fn int(v: i64) -> Expr {
    Expr::new(ExprKind::Literal(Literal::Int(v)))
}

fn float(v: f64) -> Expr {
    Expr::new(ExprKind::Literal(Literal::Float(v)))
}

fn text(s: &str) -> Expr {
    Expr::new(ExprKind::Literal(Literal::String(s.into())))
}

fn yes() -> Expr {
    Expr::new(ExprKind::Literal(Literal::Bool(true)))
}

fn name(n: &str) -> Expr {
    Expr::new(ExprKind::Name(n.into()))
}

fn call(method: &str, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::Call {
        target: None,
        method: method.into(),
        type_args: vec![],
        args,
    })
}

fn binary(op: chipflow_lower::source::BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(ExprKind::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

fn expr(e: Expr) -> Stmt {
    Stmt::new(StmtKind::Expr(e))
}

fn log(message: &str) -> Stmt {
    expr(call("DebugLog", vec![text(message)]))
}

fn log_value(value: Expr) -> Stmt {
    expr(call("DebugLog", vec![call("ToString", vec![value])]))
}

fn local(n: &str, ty: PredefinedType, init: Expr) -> Stmt {
    Stmt::new(StmtKind::Local {
        name: n.into(),
        ty: Some(TypeRef::Predefined(ty)),
        init: Some(init),
    })
}

fn assign(target: &str, value: Expr) -> Stmt {
    expr(Expr::new(ExprKind::Assign {
        target: target.into(),
        op: None,
        value: Box::new(value),
    }))
}

fn block(stmts: Vec<Stmt>) -> Stmt {
    Stmt::new(StmtKind::Block(Block::of(stmts)))
}

fn if_else(cond: Expr, then: Vec<Stmt>, otherwise: Option<Vec<Stmt>>) -> Stmt {
    Stmt::new(StmtKind::If {
        cond,
        then: Box::new(block(then)),
        otherwise: otherwise.map(|s| Box::new(block(s))),
    })
}

fn while_loop(cond: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::new(StmtKind::While {
        cond,
        body: Box::new(block(body)),
    })
}

fn section(labels: Vec<SwitchLabel>, stmts: Vec<Stmt>) -> SwitchSection {
    SwitchSection { labels, stmts }
}

fn void() -> TypeRef {
    TypeRef::Predefined(PredefinedType::Void)
}

fn method(n: &str, return_type: TypeRef, params: Vec<ParamDecl>, body: Vec<Stmt>) -> MethodDecl {
    MethodDecl {
        id: Default::default(),
        span: Span::new(1, 1),
        name: n.into(),
        attributes: vec![],
        params,
        return_type,
        tuple_names: None,
        body: Block::of(body),
    }
}

fn circuit(body: Vec<Stmt>) -> SourceTree {
    program(vec![method("CircuitGraph", void(), vec![], body)])
}

fn program(methods: Vec<MethodDecl>) -> SourceTree {
    SourceTree {
        name: "Test".into(),
        methods,
    }
}

fn lower_ok(tree: &SourceTree) -> Context {
    lower(tree, &TableOracle::new()).expect("lowering should succeed")
}

fn lower_err(tree: &SourceTree) -> LoweringError {
    lower(tree, &TableOracle::new()).expect_err("lowering should fail")
}

// ---------------------------------------------------------------------------
// Graph queries
// ---------------------------------------------------------------------------

/// The `DebugLog` node printing `message`.
fn log_node(ctx: &Context, message: &str) -> NodeId {
    ctx.nodes_of_kind("DebugLog")
        .into_iter()
        .find(|n| n.inputs[0].literal == Some(Literal::String(message.into())))
        .unwrap_or_else(|| panic!("no DebugLog(\"{}\")", message))
        .id
}

fn only(ctx: &Context, kind: &str) -> NodeId {
    let nodes = ctx.nodes_of_kind(kind);
    assert_eq!(nodes.len(), 1, "expected exactly one {}", kind);
    nodes[0].id
}

fn out(node: NodeId, index: u32) -> Port {
    Port::exec(node, index)
}

// ---------------------------------------------------------------------------
// If
// ---------------------------------------------------------------------------

#[test]
fn empty_if_is_elided() {
    let ctx = lower_ok(&circuit(vec![
        log("before"),
        if_else(yes(), vec![], Some(vec![])),
        log("after"),
    ]));

    assert!(ctx.nodes_of_kind("If").is_empty());
    let before = log_node(&ctx, "before");
    let after = log_node(&ctx, "after");
    assert_eq!(ctx.exec_sources(after), vec![out(before, 0)]);
}

#[test]
fn elided_if_leaves_the_same_graph_as_no_if() {
    let elided = lower_ok(&circuit(vec![
        if_else(yes(), vec![], Some(vec![])),
        log("after"),
    ]));
    let plain = lower_ok(&circuit(vec![log("after")]));

    assert_eq!(elided.to_artifact(), plain.to_artifact());
    assert_eq!(
        elided.to_artifact().fingerprint().unwrap(),
        plain.to_artifact().fingerprint().unwrap()
    );
}

#[test]
fn if_branches_merge_into_following_statement() {
    let ctx = lower_ok(&circuit(vec![
        log("start"),
        if_else(yes(), vec![log("a")], Some(vec![log("b")])),
        log("c"),
    ]));

    let node = only(&ctx, "If");
    assert_eq!(ctx.node(node).unwrap().exec_outputs, 2);
    assert_eq!(ctx.exec_sources(node), vec![out(log_node(&ctx, "start"), 0)]);
    assert_eq!(ctx.exec_sources(log_node(&ctx, "a")), vec![out(node, 0)]);
    assert_eq!(ctx.exec_sources(log_node(&ctx, "b")), vec![out(node, 1)]);

    let c = ctx.exec_sources(log_node(&ctx, "c"));
    assert_eq!(c.len(), 2);
    assert!(c.contains(&out(log_node(&ctx, "a"), 0)));
    assert!(c.contains(&out(log_node(&ctx, "b"), 0)));
}

#[test]
fn missing_else_falls_through() {
    let ctx = lower_ok(&circuit(vec![
        if_else(yes(), vec![log("a")], None),
        log("c"),
    ]));
    let node = only(&ctx, "If");
    let c = ctx.exec_sources(log_node(&ctx, "c"));
    assert!(c.contains(&out(node, 1)));
    assert!(c.contains(&out(log_node(&ctx, "a"), 0)));
}

// ---------------------------------------------------------------------------
// Promotion
// ---------------------------------------------------------------------------

#[test]
fn local_written_in_branch_is_promoted() {
    let ctx = lower_ok(&circuit(vec![
        local("x", PredefinedType::Int, int(0)),
        if_else(yes(), vec![assign("x", int(1))], None),
        log_value(name("x")),
    ]));

    let backing = only(&ctx, "Variable");
    let variable = ctx.node(backing).unwrap();
    assert_eq!(variable.metadata.get("name"), Some(&json!("x")));
    // The literal initial value becomes the variable default; no entry write.
    assert!(variable.metadata.contains_key("default"));

    let write = only(&ctx, "SetVariable");
    let write_node = ctx.node(write).unwrap();
    assert_eq!(write_node.metadata.get("variable"), Some(&json!(backing.0)));
    assert_eq!(write_node.inputs[0].literal, Some(Literal::Int(1)));
    assert_eq!(ctx.exec_sources(write), vec![out(only(&ctx, "If"), 0)]);

    // After the conditional the local reads the merged value.
    let to_string = only(&ctx, "ToString");
    assert_eq!(
        ctx.data_source(Port::data(to_string, 0)),
        Some(Port::data(backing, 0))
    );
}

#[test]
fn unchanged_local_is_not_written() {
    let ctx = lower_ok(&circuit(vec![
        local("x", PredefinedType::Int, int(0)),
        if_else(yes(), vec![log_value(name("x"))], None),
    ]));
    assert!(ctx.nodes_of_kind("SetVariable").is_empty());
}

#[test]
fn port_valued_local_gets_an_entry_write() {
    let count = call("ListCount", vec![call("ListCreate", vec![int(1), int(2)])]);
    let ctx = lower_ok(&circuit(vec![
        local("n", PredefinedType::Int, count),
        if_else(yes(), vec![assign("n", int(5))], None),
    ]));

    let writes = ctx.nodes_of_kind("SetVariable");
    assert_eq!(writes.len(), 2);
    let list_count = only(&ctx, "ListCount");
    let seed = writes
        .iter()
        .find(|w| ctx.data_source(Port::data(w.id, 0)) == Some(Port::data(list_count, 0)))
        .expect("entry write of the initial value");
    // The entry write runs before the conditional.
    assert_eq!(ctx.exec_sources(only(&ctx, "If")), vec![out(seed.id, 0)]);
}

// ---------------------------------------------------------------------------
// Switch
// ---------------------------------------------------------------------------

#[test]
fn switch_sections_share_outputs() {
    let ctx = lower_ok(&circuit(vec![
        Stmt::new(StmtKind::Switch {
            subject: int(2),
            sections: vec![
                section(
                    vec![SwitchLabel::Case(int(1)), SwitchLabel::Case(int(2))],
                    vec![log("low"), Stmt::new(StmtKind::Break)],
                ),
                section(
                    vec![SwitchLabel::Case(int(3))],
                    vec![log("three"), Stmt::new(StmtKind::Break)],
                ),
                section(
                    vec![SwitchLabel::Default],
                    vec![log("other"), Stmt::new(StmtKind::Break)],
                ),
            ],
        }),
        log("end"),
    ]));

    let switch = only(&ctx, "ExecutionIntegerSwitch");
    let node = ctx.node(switch).unwrap();
    assert_eq!(node.exec_outputs, 3);
    assert_eq!(node.inputs[0].literal, Some(Literal::Int(2)));
    assert_eq!(node.metadata.get("case_outputs"), Some(&json!([1, 1, 2])));

    assert_eq!(ctx.exec_sources(log_node(&ctx, "other")), vec![out(switch, 0)]);
    assert_eq!(ctx.exec_sources(log_node(&ctx, "low")), vec![out(switch, 1)]);
    assert_eq!(ctx.exec_sources(log_node(&ctx, "three")), vec![out(switch, 2)]);
    assert_eq!(ctx.exec_sources(log_node(&ctx, "end")).len(), 3);
}

#[test]
fn string_switch_without_default_falls_through_output_zero() {
    let ctx = lower_ok(&circuit(vec![
        local("s", PredefinedType::String, text("a")),
        Stmt::new(StmtKind::Switch {
            subject: name("s"),
            sections: vec![section(
                vec![SwitchLabel::Case(text("a"))],
                vec![log("a"), Stmt::new(StmtKind::Break)],
            )],
        }),
        log("end"),
    ]));
    let switch = only(&ctx, "ExecutionStringSwitch");
    let end = ctx.exec_sources(log_node(&ctx, "end"));
    assert!(end.contains(&out(switch, 0)));
    assert!(end.contains(&out(log_node(&ctx, "a"), 0)));
}

#[test]
fn goto_case_reaches_later_section() {
    let ctx = lower_ok(&circuit(vec![
        Stmt::new(StmtKind::Switch {
            subject: int(1),
            sections: vec![
                section(
                    vec![SwitchLabel::Case(int(1))],
                    vec![log("one"), Stmt::new(StmtKind::Goto(GotoTarget::Case(int(2))))],
                ),
                section(
                    vec![SwitchLabel::Case(int(2))],
                    vec![log("two"), Stmt::new(StmtKind::Break)],
                ),
            ],
        }),
        log("end"),
    ]));
    let switch = only(&ctx, "ExecutionIntegerSwitch");
    let two = ctx.exec_sources(log_node(&ctx, "two"));
    assert!(two.contains(&out(switch, 2)));
    assert!(two.contains(&out(log_node(&ctx, "one"), 0)));
}

#[test]
fn goto_case_writes_locals_declared_inside_an_enclosing_branch() {
    let switch = Stmt::new(StmtKind::Switch {
        subject: int(1),
        sections: vec![
            section(
                vec![SwitchLabel::Case(int(1))],
                vec![
                    assign("v", int(5)),
                    Stmt::new(StmtKind::Goto(GotoTarget::Case(int(2)))),
                ],
            ),
            section(
                vec![SwitchLabel::Case(int(2))],
                vec![log_value(name("v")), Stmt::new(StmtKind::Break)],
            ),
        ],
    });
    let ctx = lower_ok(&circuit(vec![if_else(
        yes(),
        vec![local("v", PredefinedType::Int, int(0)), switch],
        None,
    )]));

    let backing = only(&ctx, "Variable");
    let write = only(&ctx, "SetVariable");
    let write_node = ctx.node(write).unwrap();
    assert_eq!(write_node.metadata.get("variable"), Some(&json!(backing.0)));
    assert_eq!(write_node.inputs[0].literal, Some(Literal::Int(5)));

    // The jump leaves through the write and the target reads the backing.
    let log = only(&ctx, "DebugLog");
    assert!(ctx.exec_sources(log).contains(&out(write, 0)));
    let to_string = only(&ctx, "ToString");
    assert_eq!(
        ctx.data_source(Port::data(to_string, 0)),
        Some(Port::data(backing, 0))
    );
}

#[test]
fn dynamic_case_key_is_fatal() {
    let count = call("ListCount", vec![call("ListCreate", vec![int(1)])]);
    let err = lower_err(&circuit(vec![
        local("k", PredefinedType::Int, count),
        Stmt::new(StmtKind::Switch {
            subject: int(1),
            sections: vec![section(
                vec![SwitchLabel::Case(name("k"))],
                vec![Stmt::new(StmtKind::Break)],
            )],
        }),
    ]));
    assert!(matches!(err, LoweringError::DynamicSwitchCase { .. }));
}

#[test]
fn folded_case_key_stays_literal() {
    use chipflow_lower::source::BinaryOp;
    let ctx = lower_ok(&circuit(vec![Stmt::new(StmtKind::Switch {
        subject: int(2),
        sections: vec![section(
            vec![SwitchLabel::Case(binary(BinaryOp::Add, int(1), int(1)))],
            vec![log("two"), Stmt::new(StmtKind::Break)],
        )],
    })]));
    let switch = only(&ctx, "ExecutionIntegerSwitch");
    assert_eq!(
        ctx.node(switch).unwrap().metadata.get("switch_cases"),
        Some(&json!([Literal::Int(2)]))
    );
    assert!(ctx.nodes_of_kind("Add").is_empty());
}

// ---------------------------------------------------------------------------
// Goto
// ---------------------------------------------------------------------------

fn goto_program(with_label: bool) -> SourceTree {
    let target = if with_label {
        Stmt::new(StmtKind::Labeled {
            label: "end".into(),
            stmt: Box::new(log("after")),
        })
    } else {
        log("after")
    };
    circuit(vec![
        log("start"),
        Stmt::new(StmtKind::Goto(GotoTarget::Label("end".into()))).at(4, 9),
        log("skipped"),
        target,
    ])
}

#[test]
fn forward_goto_resolves_to_label() {
    let ctx = lower_ok(&goto_program(true));
    let start = log_node(&ctx, "start");
    let skipped = log_node(&ctx, "skipped");
    let after = log_node(&ctx, "after");

    assert!(ctx.exec_sources(skipped).is_empty());
    assert_eq!(ctx.exec_sources(after), vec![out(start, 0), out(skipped, 0)]);
}

#[test]
fn goto_without_label_is_fatal() {
    let err = lower_err(&goto_program(false));
    assert_eq!(
        err,
        LoweringError::UnresolvedGoto {
            label: "end".into(),
            span: Span::new(4, 9),
        }
    );
    assert!(err.to_string().starts_with("4:9:"));
}

#[test]
fn backward_goto_forms_a_loop() {
    let ctx = lower_ok(&circuit(vec![
        Stmt::new(StmtKind::Labeled {
            label: "top".into(),
            stmt: Box::new(log("body")),
        }),
        Stmt::new(StmtKind::Goto(GotoTarget::Label("top".into()))),
    ]));
    let body = log_node(&ctx, "body");
    assert_eq!(ctx.exec_sources(body), vec![out(body, 0)]);
}

#[test]
fn duplicate_label_is_fatal() {
    let labeled = |s: &str| {
        Stmt::new(StmtKind::Labeled {
            label: "l".into(),
            stmt: Box::new(log(s)),
        })
    };
    let err = lower_err(&circuit(vec![labeled("a"), labeled("b")]));
    assert!(matches!(err, LoweringError::DuplicateLabel { .. }));
}

// ---------------------------------------------------------------------------
// Returns and inlining
// ---------------------------------------------------------------------------

#[test]
fn returns_are_collected_and_last_value_wins() {
    let pick = method(
        "Pick",
        TypeRef::Predefined(PredefinedType::Int),
        vec![ParamDecl {
            name: "c".into(),
            ty: TypeRef::Predefined(PredefinedType::Bool),
        }],
        vec![
            if_else(
                name("c"),
                vec![log("a"), Stmt::new(StmtKind::Return(Some(int(1))))],
                None,
            ),
            Stmt::new(StmtKind::Return(Some(int(2)))),
        ],
    );
    let main = method(
        "CircuitGraph",
        void(),
        vec![],
        vec![
            local("v", PredefinedType::Int, call("Pick", vec![yes()])),
            log_value(name("v")),
        ],
    );
    let ctx = lower_ok(&program(vec![main, pick]));

    let node = only(&ctx, "If");
    let to_string = only(&ctx, "ToString");
    assert_eq!(
        ctx.node(to_string).unwrap().inputs[0].literal,
        Some(Literal::Int(2))
    );
    let log = ctx.nodes_of_kind("DebugLog")
        .into_iter()
        .find(|n| ctx.data_source(Port::data(n.id, 0)).is_some())
        .unwrap()
        .id;
    let sources = ctx.exec_sources(log);
    assert_eq!(sources.len(), 2);
    assert!(sources.contains(&out(log_node(&ctx, "a"), 0)));
    assert!(sources.contains(&out(node, 1)));
}

#[test]
fn void_method_returning_value_is_fatal() {
    let bad = method(
        "Bad",
        void(),
        vec![],
        vec![Stmt::new(StmtKind::Return(Some(int(1))))],
    );
    let main = method("CircuitGraph", void(), vec![], vec![expr(call("Bad", vec![]))]);
    let err = lower_err(&program(vec![main, bad]));
    assert!(matches!(err, LoweringError::ReturnArityMismatch { .. }));
}

fn pair_type(first: Option<&str>, second: Option<&str>) -> TypeRef {
    TypeRef::Tuple(vec![
        TupleElement {
            name: first.map(str::to_string),
            ty: TypeRef::Predefined(PredefinedType::Int),
        },
        TupleElement {
            name: second.map(str::to_string),
            ty: TypeRef::Predefined(PredefinedType::Bool),
        },
    ])
}

fn pair_program(return_type: TypeRef) -> SourceTree {
    let pair = method(
        "Pair",
        return_type,
        vec![],
        vec![Stmt::new(StmtKind::Return(Some(Expr::new(ExprKind::Tuple(
            vec![int(1), yes()],
        )))))],
    );
    let main = method("CircuitGraph", void(), vec![], vec![expr(call("Pair", vec![]))]);
    program(vec![main, pair])
}

#[test]
fn unnamed_tuple_return_is_fatal() {
    let err = lower_err(&pair_program(pair_type(None, None)));
    match err {
        LoweringError::ReturnArityMismatch { method, detail, .. } => {
            assert_eq!(method, "Pair");
            assert!(detail.contains("no element names"), "{}", detail);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn tuple_names_must_match_arity() {
    let mut tree = pair_program(pair_type(Some("count"), Some("ok")));
    tree.methods[1].tuple_names = Some(vec!["count".into()]);
    let err = lower_err(&tree);
    assert!(matches!(err, LoweringError::ReturnArityMismatch { .. }));

    lower_ok(&pair_program(pair_type(Some("count"), Some("ok"))));
    // Partly named tuples fall back to positional names.
    lower_ok(&pair_program(pair_type(Some("count"), None)));
}

#[test]
fn recursion_hits_inline_limit() {
    let rec = method("Rec", void(), vec![], vec![expr(call("Rec", vec![]))]);
    let main = method("CircuitGraph", void(), vec![], vec![expr(call("Rec", vec![]))]);
    let options = LowerOptions {
        max_inline_depth: 8,
        ..LowerOptions::default()
    };
    let err = lower_with(&program(vec![main, rec]), &TableOracle::new(), &options).unwrap_err();
    assert!(matches!(err, LoweringError::InlineDepthExceeded { limit: 8, .. }));
}

#[test]
fn missing_entry_is_reported() {
    let tree = program(vec![method("Other", void(), vec![], vec![])]);
    assert_eq!(
        lower_err(&tree),
        LoweringError::EntryNotFound {
            name: "CircuitGraph".into()
        }
    );
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

#[test]
fn while_loop_promotes_counter() {
    use chipflow_lower::source::BinaryOp;
    let ctx = lower_ok(&circuit(vec![
        local("i", PredefinedType::Int, int(0)),
        while_loop(
            binary(BinaryOp::Less, name("i"), int(3)),
            vec![
                log("tick"),
                assign("i", binary(BinaryOp::Add, name("i"), int(1))),
            ],
        ),
        log("done"),
    ]));

    let guard = only(&ctx, "If");
    let backing = only(&ctx, "Variable");
    let less = only(&ctx, "LessThan");
    assert_eq!(ctx.data_source(Port::data(less, 0)), Some(Port::data(backing, 0)));
    assert_eq!(ctx.exec_sources(log_node(&ctx, "tick")), vec![out(guard, 0)]);
    assert_eq!(ctx.exec_sources(log_node(&ctx, "done")), vec![out(guard, 1)]);

    // One write per iteration plus the entry write of the initial value.
    let writes = ctx.nodes_of_kind("SetVariable");
    assert_eq!(writes.len(), 2);
    let guard_sources = ctx.exec_sources(guard);
    assert_eq!(guard_sources.len(), 2);
    for write in writes {
        assert!(guard_sources.contains(&out(write.id, 0)));
    }
    assert!(!ctx.node(guard).unwrap().metadata.contains_key("needs_manual_implementation"));
}

#[test]
fn break_and_continue_in_while() {
    let ctx = lower_ok(&circuit(vec![
        while_loop(
            yes(),
            vec![
                if_else(yes(), vec![Stmt::new(StmtKind::Break)], None),
                if_else(yes(), vec![Stmt::new(StmtKind::Continue)], None),
                log("x"),
            ],
        ),
        log("after"),
    ]));

    let ifs = ctx.nodes_of_kind("If");
    assert_eq!(ifs.len(), 3);
    let (guard, breaking, continuing) = (ifs[0].id, ifs[1].id, ifs[2].id);

    let after = ctx.exec_sources(log_node(&ctx, "after"));
    assert!(after.contains(&out(guard, 1)));
    assert!(after.contains(&out(breaking, 0)));
    assert!(ctx.has_exec_connection(out(continuing, 0), Port::exec(guard, 0)));
    assert!(ctx.has_exec_connection(out(log_node(&ctx, "x"), 0), Port::exec(guard, 0)));
}

#[test]
fn do_while_jumps_back_to_body() {
    use chipflow_lower::source::BinaryOp;
    let ctx = lower_ok(&circuit(vec![
        local("n", PredefinedType::Int, int(0)),
        Stmt::new(StmtKind::DoWhile {
            body: Box::new(block(vec![
                log("body"),
                assign("n", binary(BinaryOp::Add, name("n"), int(1))),
            ])),
            cond: binary(BinaryOp::Less, name("n"), int(3)),
        }),
        log("done"),
    ]));

    let guard = only(&ctx, "If");
    let body = log_node(&ctx, "body");
    assert!(ctx.has_exec_connection(out(guard, 0), Port::exec(body, 0)));
    assert_eq!(ctx.exec_sources(log_node(&ctx, "done")), vec![out(guard, 1)]);
    assert_eq!(ctx.nodes_of_kind("SetVariable").len(), 2);
}

#[test]
fn foreach_binds_iteration_value() {
    let list = call("ListCreate", vec![int(1), int(2)]);
    let ctx = lower_ok(&circuit(vec![
        Stmt::new(StmtKind::ForEach {
            name: "n".into(),
            ty: None,
            collection: list,
            body: Box::new(block(vec![log_value(name("n"))])),
        }),
        log("done"),
    ]));

    let each = only(&ctx, "ForEach");
    let create = only(&ctx, "ListCreate");
    assert_eq!(ctx.node(create).unwrap().inputs.len(), 2);
    assert_eq!(ctx.data_source(Port::data(each, 0)), Some(Port::data(create, 0)));
    let to_string = only(&ctx, "ToString");
    assert_eq!(ctx.data_source(Port::data(to_string, 0)), Some(Port::data(each, 0)));

    let log = ctx.nodes_of_kind("DebugLog")[0].id;
    assert_eq!(ctx.exec_sources(log), vec![out(each, 0)]);
    assert_eq!(ctx.exec_sources(log_node(&ctx, "done")), vec![out(each, 1)]);
}

#[test]
fn break_in_foreach_needs_manual_iterator() {
    let ctx = lower_ok(&circuit(vec![Stmt::new(StmtKind::ForEach {
        name: "n".into(),
        ty: None,
        collection: call("ListCreate", vec![int(1)]),
        body: Box::new(block(vec![Stmt::new(StmtKind::Break)])),
    })]));
    let each = only(&ctx, "ForEach");
    assert_eq!(
        ctx.node(each).unwrap().metadata.get("needs_manual_implementation"),
        Some(&json!(true))
    );
}

#[test]
fn break_in_while_and_do_while_keeps_the_graph_loop() {
    let ctx = lower_ok(&circuit(vec![while_loop(
        yes(),
        vec![log("once"), Stmt::new(StmtKind::Break)],
    )]));
    let guard = ctx.node(only(&ctx, "If")).unwrap();
    assert!(!guard.metadata.contains_key("needs_manual_implementation"));

    let ctx = lower_ok(&circuit(vec![Stmt::new(StmtKind::DoWhile {
        body: Box::new(block(vec![log("once"), Stmt::new(StmtKind::Break)])),
        cond: yes(),
    })]));
    let guard = ctx.node(only(&ctx, "If")).unwrap();
    assert!(!guard.metadata.contains_key("needs_manual_implementation"));
}

#[test]
fn delay_in_loop_needs_manual_iterator() {
    let ctx = lower_ok(&circuit(vec![while_loop(
        yes(),
        vec![expr(call("Delay", vec![float(1.0)])), log("later")],
    )]));
    let guard = only(&ctx, "If");
    let delay = only(&ctx, "Delay");
    assert_eq!(ctx.exec_sources(log_node(&ctx, "later")), vec![out(delay, 1)]);
    assert_eq!(
        ctx.node(guard).unwrap().metadata.get("needs_manual_implementation"),
        Some(&json!(true))
    );
}

#[test]
fn break_outside_loop_is_fatal() {
    let err = lower_err(&circuit(vec![Stmt::new(StmtKind::Break)]));
    assert!(matches!(err, LoweringError::MisplacedJump { .. }));
}

// ---------------------------------------------------------------------------
// Events, shared properties and sub-boards
// ---------------------------------------------------------------------------

#[test]
fn event_function_is_built_once_and_sent_per_call() {
    let mut ping = method(
        "Ping",
        void(),
        vec![ParamDecl {
            name: "n".into(),
            ty: TypeRef::Predefined(PredefinedType::Int),
        }],
        vec![log_value(name("n"))],
    );
    ping.attributes = vec!["EventFunction".into()];
    let main = method(
        "CircuitGraph",
        void(),
        vec![],
        vec![expr(call("Ping", vec![int(1)])), expr(call("Ping", vec![int(2)]))],
    );
    let ctx = lower_ok(&program(vec![main, ping]));

    let receiver = only(&ctx, "EventReceiver");
    only(&ctx, "EventDefinition");
    let senders = ctx.nodes_of_kind("EventSender");
    assert_eq!(senders.len(), 2);
    assert_eq!(senders[0].metadata.get("event"), Some(&json!("Ping")));
    assert_eq!(senders[0].metadata.get("target"), Some(&json!("LOCAL")));
    assert_eq!(senders[1].inputs[0].literal, Some(Literal::Int(2)));
    assert_eq!(ctx.exec_sources(senders[1].id), vec![out(senders[0].id, 0)]);

    let to_string = only(&ctx, "ToString");
    assert_eq!(ctx.data_source(Port::data(to_string, 0)), Some(Port::data(receiver, 0)));
    let log = ctx.nodes_of_kind("DebugLog")[0].id;
    assert_eq!(ctx.exec_sources(log), vec![out(receiver, 0)]);
}

#[test]
fn event_function_attribute_selects_target() {
    let mut ping = method("Ping", void(), vec![], vec![log("pong")]);
    ping.attributes = vec!["EventFunction(Others)".into()];
    let main = method("CircuitGraph", void(), vec![], vec![expr(call("Ping", vec![]))]);
    let ctx = lower_ok(&program(vec![main, ping]));

    let sender = ctx.node(only(&ctx, "EventSender")).unwrap();
    assert_eq!(sender.metadata.get("target"), Some(&json!("OTHERS")));
}

#[test]
fn shared_property_is_built_once() {
    let mut answer = method(
        "Answer",
        TypeRef::Predefined(PredefinedType::Int),
        vec![],
        vec![Stmt::new(StmtKind::Return(Some(call(
            "ListCount",
            vec![call("ListCreate", vec![int(1), int(2)])],
        ))))],
    );
    answer.attributes = vec!["SharedProperty".into()];
    let main = method(
        "CircuitGraph",
        void(),
        vec![],
        vec![log_value(call("Answer", vec![])), log_value(call("Answer", vec![]))],
    );
    let ctx = lower_ok(&program(vec![main, answer]));

    let count = only(&ctx, "ListCount");
    let to_strings = ctx.nodes_of_kind("ToString");
    assert_eq!(to_strings.len(), 2);
    for node in to_strings {
        assert_eq!(ctx.data_source(Port::data(node.id, 0)), Some(Port::data(count, 0)));
    }
}

#[test]
fn existing_circuit_board_builds_sub_context() {
    let board = call(
        "ExistingCircuitBoard",
        vec![
            text("Door"),
            Expr::new(ExprKind::Lambda(Block::of(vec![log("open")]))),
        ],
    );
    let ctx = lower_ok(&circuit(vec![log("outer"), expr(board)]));

    assert_eq!(ctx.node_count(), 1);
    let subs = ctx.sub_contexts();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].anchor(), Some("Door"));
    let open = log_node(&subs[0], "open");
    assert!(subs[0].exec_sources(open).is_empty());

    let artifact = ctx.to_artifact();
    assert_eq!(artifact.sub_contexts.len(), 1);
    assert_eq!(artifact.sub_contexts[0].anchor.as_deref(), Some("Door"));
}

#[test]
fn throw_terminates_flow() {
    let ctx = lower_ok(&circuit(vec![
        log("a"),
        Stmt::new(StmtKind::Throw(None)),
        log("b"),
    ]));
    assert!(ctx.exec_sources(log_node(&ctx, "b")).is_empty());
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[test]
fn interpolation_concatenates_parts() {
    let player_name = call("PlayerGetName", vec![call("GetLocalPlayer", vec![])]);
    let message = Expr::new(ExprKind::Interpolated(vec![
        InterpolationPart::Text("hi ".into()),
        InterpolationPart::Hole {
            expr: name("who"),
            alignment: None,
            format: None,
        },
        InterpolationPart::Text(", ".into()),
        InterpolationPart::Hole {
            expr: int(2),
            alignment: None,
            format: None,
        },
        InterpolationPart::Text("!".into()),
    ]));
    let ctx = lower_ok(&circuit(vec![
        local("who", PredefinedType::String, player_name),
        expr(call("DebugLog", vec![message])),
    ]));

    let concat = ctx.node(only(&ctx, "StringConcat")).unwrap();
    assert_eq!(concat.inputs.len(), 3);
    assert_eq!(concat.inputs[0].literal, Some(Literal::String("hi ".into())));
    assert_eq!(concat.inputs[2].literal, Some(Literal::String(", 2!".into())));
    assert_eq!(
        ctx.data_source(Port::data(concat.id, 1)),
        Some(Port::data(only(&ctx, "PlayerGetName"), 0))
    );
}

#[test]
fn literal_interpolation_folds_to_literal() {
    let message = Expr::new(ExprKind::Interpolated(vec![
        InterpolationPart::Text("n=".into()),
        InterpolationPart::Hole {
            expr: float(2.0),
            alignment: None,
            format: None,
        },
    ]));
    let ctx = lower_ok(&circuit(vec![expr(call("DebugLog", vec![message]))]));
    assert!(ctx.nodes_of_kind("StringConcat").is_empty());
    log_node(&ctx, "n=2");
}

#[test]
fn unknown_chip_is_fatal() {
    let err = lower_err(&circuit(vec![expr(call("NoSuchChip", vec![]))]));
    assert!(matches!(err, LoweringError::UnknownChip { .. }));
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

/// Statement vocabulary for generated programs, indexed by `code % 6`.
fn generated_stmt(code: u8, n: usize) -> Stmt {
    let message = format!("m{}", n);
    match code % 6 {
        0 => log(&message),
        1 => if_else(yes(), vec![log(&message)], Some(vec![assign("x", int(n as i64))])),
        2 => while_loop(
            yes(),
            vec![
                assign("x", int(n as i64)),
                if_else(yes(), vec![Stmt::new(StmtKind::Break)], None),
            ],
        ),
        3 => log_value(name("x")),
        4 => Stmt::new(StmtKind::Switch {
            subject: name("x"),
            sections: vec![
                section(vec![SwitchLabel::Case(int(1))], vec![log(&message), Stmt::new(StmtKind::Break)]),
                section(vec![SwitchLabel::Default], vec![Stmt::new(StmtKind::Break)]),
            ],
        }),
        _ => Stmt::new(StmtKind::ForEach {
            name: "n".into(),
            ty: None,
            collection: call("ListCreate", vec![int(1), int(2)]),
            body: Box::new(block(vec![log_value(name("n"))])),
        }),
    }
}

proptest::proptest! {
    #[test]
    fn lowering_is_deterministic(codes in proptest::collection::vec(0u8..6, 0..12)) {
        let mut stmts = vec![local("x", PredefinedType::Int, int(0))];
        stmts.extend(codes.iter().enumerate().map(|(n, code)| generated_stmt(*code, n)));
        let tree = circuit(stmts);

        let first = lower_ok(&tree).to_artifact();
        let second = lower_ok(&tree).to_artifact();
        proptest::prop_assert_eq!(&first, &second);
        proptest::prop_assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
    }
}
