use std::sync::Arc;

use tokio_test::assert_ok;

use rowlink::source::{DataSource, MemorySource};
use rowlink::{
    CancellationToken, ColumnMapping, CompiledPlan, DataType, DbError, ElementExecutor,
    ExecutionContext, FinalizedPlan, PassThroughOptimizer, PlanFinalizer, PlanStatement,
    QueryExecutor, RowMapper, RowMapping, SelectClause, Value,
};

fn numbers_source(count: i64) -> Arc<MemorySource> {
    let mut builder = MemorySource::builder().column("n", DataType::Integer);
    for n in 1..=count {
        builder = builder.row(vec![Value::Integer(n)]);
    }
    Arc::new(builder.build())
}

fn plan_for(source: &MemorySource) -> Arc<FinalizedPlan> {
    Arc::new(
        PlanFinalizer::finalize(
            CompiledPlan::single(PlanStatement::new(SelectClause::new("SELECT n FROM t"), vec![])),
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

#[tokio::test]
async fn test_push_delivery_in_row_order() {
    let source = numbers_source(4);
    let plan = plan_for(&source);
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

    assert_eq!(delivered, vec![1, 2, 3, 4]);
    assert_eq!(ctx.rows_count(), 4);
    assert_eq!(source.open_cursors(), 0);
}

#[tokio::test]
async fn test_handler_false_stops_early() {
    let source = numbers_source(10);
    let plan = plan_for(&source);
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
            n < 2
        },
        CancellationToken::new(),
    )
    .await
    .unwrap();

    // Early stop is not an error: the handler saw two rows and the cursor
    // stopped pulling immediately after.
    assert_eq!(delivered, vec![1, 2]);
    assert_eq!(source.rows_read(), 2);
    assert_eq!(source.open_cursors(), 0);
}

#[tokio::test]
async fn test_pre_cancelled_token_delivers_nothing() {
    let source = numbers_source(5);
    let plan = plan_for(&source);
    let ctx = Arc::new(ExecutionContext::new(vec![]));

    let token = CancellationToken::new();
    token.cancel();

    let mut delivered = 0u32;
    let err = QueryExecutor::execute_rows_async(
        plan,
        ctx.clone(),
        source.clone(),
        int_mapper(),
        0,
        |_| {
            delivered += 1;
            true
        },
        token,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DbError::Cancelled));
    assert_eq!(delivered, 0);
    assert_eq!(ctx.rows_count(), 0);
    assert_eq!(source.open_cursors(), 0);
}

#[tokio::test]
async fn test_cancel_mid_stream_stops_before_next_delivery() {
    let source = numbers_source(10);
    let plan = plan_for(&source);
    let ctx = Arc::new(ExecutionContext::new(vec![]));

    let token = CancellationToken::new();
    let handler_token = token.clone();
    let mut delivered = Vec::new();
    let err = QueryExecutor::execute_rows_async(
        plan,
        ctx,
        source.clone(),
        int_mapper(),
        0,
        |n| {
            delivered.push(n);
            if n == 2 {
                handler_token.cancel();
            }
            true
        },
        token,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DbError::Cancelled));
    // Nothing was delivered after the signal, and the cursor was released.
    assert_eq!(delivered, vec![1, 2]);
    assert_eq!(source.open_cursors(), 0);
}

#[tokio::test]
async fn test_async_mapper_fallback_is_transparent() {
    let source = Arc::new(
        MemorySource::builder()
            .column("n", DataType::Integer)
            .row(vec![Value::Integer(1)])
            .row(vec![Value::Text("42".into())])
            .row(vec![Value::Integer(3)])
            .build(),
    );
    let plan = plan_for(&source);
    let ctx = Arc::new(ExecutionContext::new(vec![]));
    let mapper = int_mapper();

    let mut delivered = Vec::new();
    QueryExecutor::execute_rows_async(
        plan,
        ctx,
        source,
        mapper.clone(),
        0,
        |n| {
            delivered.push(n);
            true
        },
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(delivered, vec![1, 42, 3]);
    assert!(mapper.is_faulted());
}

#[tokio::test]
async fn test_mapping_error_releases_cursor_async() {
    let source = Arc::new(
        MemorySource::builder()
            .column("n", DataType::Integer)
            .row(vec![Value::Integer(1)])
            .row(vec![Value::Text("not a number".into())])
            .build(),
    );
    let plan = plan_for(&source);
    let ctx = Arc::new(ExecutionContext::new(vec![]));

    let err = QueryExecutor::execute_rows_async(
        plan,
        ctx,
        source.clone(),
        int_mapper(),
        0,
        |_| true,
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(err.is_mapping_fault());
    assert_eq!(source.open_cursors(), 0);
}

#[tokio::test]
async fn test_element_async() {
    let source = numbers_source(3);
    let plan = plan_for(&source);
    let ctx = ExecutionContext::new(vec![]);
    let mapper = int_mapper();

    let element = ElementExecutor::execute_element_async(
        &plan,
        &ctx,
        source.as_ref(),
        &mapper,
        0,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(element, Some(1));
    assert_eq!(source.rows_read(), 1);
    assert_eq!(source.open_cursors(), 0);
}

#[tokio::test]
async fn test_element_async_cancelled() {
    let source = numbers_source(3);
    let plan = plan_for(&source);
    let ctx = ExecutionContext::new(vec![]);
    let mapper = int_mapper();

    let token = CancellationToken::new();
    token.cancel();

    let err = ElementExecutor::execute_element_async(
        &plan,
        &ctx,
        source.as_ref(),
        &mapper,
        0,
        token,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DbError::Cancelled));
    assert_eq!(source.rows_read(), 0);
    assert_eq!(source.open_cursors(), 0);
}

#[tokio::test]
async fn test_empty_source_completes_cleanly() {
    let source = numbers_source(0);
    let plan = plan_for(&source);
    let ctx = Arc::new(ExecutionContext::new(vec![]));

    let mut delivered = 0u32;
    assert_ok!(
        QueryExecutor::execute_rows_async(
            plan,
            ctx.clone(),
            source.clone(),
            int_mapper(),
            0,
            |_| {
                delivered += 1;
                true
            },
            CancellationToken::new(),
        )
        .await
    );

    assert_eq!(delivered, 0);
    assert_eq!(ctx.rows_count(), 0);
    assert_eq!(source.open_cursors(), 0);
}
