use std::sync::Arc;

use rowlink::source::{DataSource, MemorySource, SourceCapabilities};
use rowlink::{
    BoundParameter, CancellationToken, ColumnMapping, CompiledPlan, DataType, ExecutionContext,
    FetchValue, FinalizedPlan, ParamExpr, PassThroughOptimizer, PlanFinalizer, PlanStatement,
    QueryExecutor, RowMapper, RowMapping, SelectClause, Value,
};

fn ten_row_source(capabilities: SourceCapabilities) -> Arc<MemorySource> {
    let mut builder = MemorySource::builder()
        .column("n", DataType::Integer)
        .capabilities(capabilities);
    for n in 1..=10 {
        builder = builder.row(vec![Value::Integer(n)]);
    }
    Arc::new(builder.build())
}

fn emulated() -> SourceCapabilities {
    SourceCapabilities {
        supports_native_skip: false,
        supports_native_limit: false,
    }
}

fn finalize_for(source: &MemorySource, select: SelectClause) -> Arc<FinalizedPlan> {
    finalize_with_params(source, select, vec![])
}

fn finalize_with_params(
    source: &MemorySource,
    select: SelectClause,
    parameters: Vec<BoundParameter>,
) -> Arc<FinalizedPlan> {
    Arc::new(
        PlanFinalizer::finalize(
            CompiledPlan::single(PlanStatement::new(select, parameters)),
            source.capabilities(),
            &PassThroughOptimizer,
        )
        .unwrap(),
    )
}

fn int_mapper() -> Arc<RowMapper<i64>> {
    Arc::new(RowMapper::with_default_registry(
        RowMapping::new(vec![ColumnMapping::new(0, DataType::Integer)]),
        |values| Ok(values[0].as_i64().unwrap_or_default()),
    ))
}

fn run(source: &Arc<MemorySource>, plan: &Arc<FinalizedPlan>, args: Vec<Value>) -> Vec<i64> {
    let ctx = Arc::new(ExecutionContext::new(args));
    QueryExecutor::execute_rows(plan.clone(), ctx, source.clone(), int_mapper(), 0)
        .unwrap()
        .collect::<rowlink::Result<_>>()
        .unwrap()
}

#[test]
fn test_emulated_skip_take_window() {
    let source = ten_row_source(emulated());
    let plan = finalize_for(
        &source,
        SelectClause::new("SELECT n FROM t")
            .skip(FetchValue::Literal(2))
            .take(FetchValue::Literal(3)),
    );

    let rows = run(&source, &plan, vec![]);

    // Rows 3-5, 1-indexed, in source order.
    assert_eq!(rows, vec![3, 4, 5]);
    // No over-fetch: skip + take pulls, nothing beyond.
    assert_eq!(source.rows_read(), 5);
}

#[test]
fn test_non_positive_literals_are_no_ops() {
    let source = ten_row_source(emulated());
    let plan = finalize_for(
        &source,
        SelectClause::new("SELECT n FROM t")
            .skip(FetchValue::Literal(0))
            .take(FetchValue::Literal(-1)),
    );

    let rows = run(&source, &plan, vec![]);

    let unemulated_source = ten_row_source(emulated());
    let unemulated_plan = finalize_for(&unemulated_source, SelectClause::new("SELECT n FROM t"));
    let unemulated = run(&unemulated_source, &unemulated_plan, vec![]);

    assert_eq!(rows, unemulated);
    assert_eq!(rows, (1..=10).collect::<Vec<i64>>());
}

#[test]
fn test_native_support_leaves_plan_unwrapped() {
    let source = ten_row_source(SourceCapabilities {
        supports_native_skip: true,
        supports_native_limit: true,
    });
    let plan = finalize_for(
        &source,
        SelectClause::new("SELECT n FROM t")
            .skip(FetchValue::Literal(2))
            .take(FetchValue::Literal(3)),
    );

    // The source claims native support, so the executor applies no client
    // side stage; the memory source ignores the clause and yields all rows.
    assert!(plan.skip.is_none());
    assert!(plan.take.is_none());
    let rows = run(&source, &plan, vec![]);
    assert_eq!(rows.len(), 10);
}

#[test]
fn test_parameter_bound_window_resolves_per_invocation() {
    let source = ten_row_source(emulated());
    let plan = finalize_with_params(
        &source,
        SelectClause::new("SELECT n FROM t")
            .parameters(vec![0, 1])
            .skip(FetchValue::Param(0))
            .take(FetchValue::Param(1)),
        vec![
            BoundParameter::new(0, ParamExpr::Arg(0)),
            BoundParameter::new(1, ParamExpr::Arg(1)),
        ],
    );

    // Same finalized plan, different call-site arguments per invocation.
    let first = run(
        &source,
        &plan,
        vec![Value::Integer(2), Value::Integer(3)],
    );
    assert_eq!(first, vec![3, 4, 5]);

    let second = run(
        &source,
        &plan,
        vec![Value::Integer(7), Value::Integer(2)],
    );
    assert_eq!(second, vec![8, 9]);

    // A negative skip skips nothing; a zero take delivers nothing.
    let third = run(
        &source,
        &plan,
        vec![Value::Integer(-5), Value::Integer(0)],
    );
    assert_eq!(third, Vec::<i64>::new());
}

#[test]
fn test_skip_beyond_result_yields_nothing() {
    let source = ten_row_source(emulated());
    let plan = finalize_for(
        &source,
        SelectClause::new("SELECT n FROM t").skip(FetchValue::Literal(20)),
    );

    let rows = run(&source, &plan, vec![]);
    assert_eq!(rows, Vec::<i64>::new());
    assert_eq!(source.open_cursors(), 0);
}

#[tokio::test]
async fn test_async_emulated_window_matches_sync() {
    let source = ten_row_source(emulated());
    let plan = finalize_for(
        &source,
        SelectClause::new("SELECT n FROM t")
            .skip(FetchValue::Literal(2))
            .take(FetchValue::Literal(3)),
    );
    let ctx = Arc::new(ExecutionContext::new(vec![]));

    let mut delivered = Vec::new();
    QueryExecutor::execute_rows_async(
        plan,
        ctx.clone(),
        source.clone(),
        int_mapper(),
        0,
        |n| {
            delivered.push(n);
            true
        },
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(delivered, vec![3, 4, 5]);
    assert_eq!(ctx.rows_count(), 3);
    assert_eq!(source.rows_read(), 5);
    assert_eq!(source.open_cursors(), 0);
}
