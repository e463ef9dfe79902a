#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::time::Duration;

use common::{Author, Book, FakeConnection, RecordingHook, affected, author_row, row, rows};
use rowmap::{BuiltStatement, Delete, Gateway, Insert, RelationStrategy, Select, StorageError, Value};

fn book_row(id: i64, title: &str, author_id: i64) -> rowmap::Row {
    row(
        &["id", "title", "author_id"],
        vec![Value::Int(id), Value::from(title), Value::Int(author_id)],
    )
}

#[tokio::test]
async fn author_and_book_round_trip() {
    let conn = FakeConnection::new();
    let gateway = Gateway::new();

    conn.reply(rows(vec![author_row(1, "Ann")]));
    let mut author = Author {
        name: "Ann".into(),
        ..Default::default()
    };
    let statement = Insert::new(&author).returning_all().build().unwrap();
    let inserted = gateway
        .execute_returning(&conn, &statement, &mut author)
        .await
        .unwrap();
    assert_eq!(inserted, 1);
    assert_eq!(author.id, 1);

    conn.reply(rows(vec![row(&["id"], vec![Value::Int(10)])]));
    let mut book = Book {
        title: "new book".into(),
        author_id: author.id,
        ..Default::default()
    };
    let statement = Insert::new(&book).returning(["id"]).build().unwrap();
    gateway
        .execute_returning(&conn, &statement, &mut book)
        .await
        .unwrap();
    assert_eq!(book.id, 10);
    assert_eq!(book.title, "new book");

    conn.reply(rows(vec![row(
        &["id", "title", "author_id", "author__id", "author__name"],
        vec![
            Value::Int(10),
            Value::from("new book"),
            Value::Int(1),
            Value::Int(1),
            Value::from("Ann"),
        ],
    )]));
    let statement = Select::<Book>::new()
        .relation("author")
        .where_expr("author.id = ?", [author.id])
        .build()
        .unwrap();
    let books: Vec<Book> = gateway.fetch(&conn, &statement).await.unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].author.as_ref(), Some(&author));

    conn.reply(affected(1));
    let statement = Delete::record(&book).unwrap().build().unwrap();
    assert_eq!(gateway.execute(&conn, &statement).await.unwrap(), 1);

    let sent = conn.statements();
    assert_eq!(sent.len(), 4);
    assert_eq!(
        sent[0],
        (
            r#"INSERT INTO "authors" ("name") VALUES ($1) RETURNING "id", "name""#.to_string(),
            vec![Value::from("Ann")]
        )
    );
    assert_eq!(sent[2].1, vec![Value::Int(1)]);
    assert_eq!(
        sent[3],
        (
            r#"DELETE FROM "books" WHERE "id" = $1"#.to_string(),
            vec![Value::Int(10)]
        )
    );
}

#[tokio::test]
async fn joined_parent_with_null_key_is_left_unset() {
    let conn = FakeConnection::new();
    conn.reply(rows(vec![row(
        &["id", "title", "author_id", "author__id", "author__name"],
        vec![
            Value::Int(3),
            Value::from("orphan"),
            Value::Int(99),
            Value::Null,
            Value::Null,
        ],
    )]));

    let statement = Select::<Book>::new().relation("author").build().unwrap();
    let book: Option<Book> = Gateway::new().fetch_optional(&conn, &statement).await.unwrap();
    let book = book.unwrap();
    assert_eq!(book.author_id, 99);
    assert_eq!(book.author, None);
}

#[tokio::test]
async fn null_values_map_to_zero_values() {
    let conn = FakeConnection::new();
    conn.reply(rows(vec![row(
        &["id", "title", "author_id"],
        vec![Value::Int(4), Value::Null, Value::Null],
    )]));

    let statement = Select::<Book>::new().build().unwrap();
    let books: Vec<Book> = Gateway::new().fetch(&conn, &statement).await.unwrap();
    assert_eq!(books[0].title, "");
    assert_eq!(books[0].author_id, 0);
}

#[tokio::test]
async fn failed_mapping_leaves_target_untouched() {
    let conn = FakeConnection::new();
    let gateway = Gateway::new();
    let existing = Book {
        id: 1,
        title: "kept".into(),
        ..Default::default()
    };
    let mut target = vec![existing.clone()];

    // Second row has a value the title field cannot hold.
    conn.reply(rows(vec![
        book_row(2, "fine", 1),
        row(
            &["id", "title", "author_id"],
            vec![Value::Int(3), Value::Bool(true), Value::Int(1)],
        ),
    ]));
    let statement = Select::<Book>::new().build().unwrap();
    let err = gateway.query(&conn, &statement, &mut target).await.unwrap_err();
    assert!(matches!(err, StorageError::Mapping(_)));
    assert_eq!(target, vec![existing.clone()]);

    // Second row is too short.
    conn.reply(rows(vec![
        book_row(2, "fine", 1),
        row(&["id", "title"], vec![Value::Int(3), Value::from("short")]),
    ]));
    let err = gateway.query(&conn, &statement, &mut target).await.unwrap_err();
    assert!(matches!(err, StorageError::Mapping(_)));
    assert_eq!(target, vec![existing]);
}

#[tokio::test]
async fn query_appends_to_target() {
    let conn = FakeConnection::new();
    conn.reply(rows(vec![book_row(2, "two", 1), book_row(3, "three", 1)]));

    let mut target = vec![Book::default()];
    let statement = Select::<Book>::new().build().unwrap();
    let appended = Gateway::new()
        .query(&conn, &statement, &mut target)
        .await
        .unwrap();

    assert_eq!(appended, 2);
    assert_eq!(target.len(), 3);
    assert_eq!(target[2].title, "three");
}

#[tokio::test]
async fn hand_written_select_maps_by_column_name() {
    let conn = FakeConnection::new();
    conn.reply(rows(vec![row(
        &["name", "id"],
        vec![Value::from("Bo"), Value::Int(2)],
    )]));
    let statement = BuiltStatement::raw("SELECT name, id FROM authors", vec![]);
    let authors: Vec<Author> = Gateway::new().fetch(&conn, &statement).await.unwrap();
    assert_eq!(
        authors,
        vec![Author {
            id: 2,
            name: "Bo".into()
        }]
    );

    conn.reply(rows(vec![row(&["email"], vec![Value::from("x")])]));
    let statement = BuiltStatement::raw("SELECT email FROM authors", vec![]);
    let err = Gateway::new()
        .fetch::<_, Author>(&conn, &statement)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Mapping(_)));
}

#[tokio::test]
async fn returning_row_count_rules() {
    let conn = FakeConnection::new();
    let gateway = Gateway::new();
    let original = Author {
        id: 0,
        name: "Cy".into(),
    };
    let statement = Insert::new(&original).returning(["id"]).build().unwrap();

    conn.reply(affected(0));
    let mut author = original.clone();
    gateway
        .execute_returning(&conn, &statement, &mut author)
        .await
        .unwrap();
    assert_eq!(author, original);

    conn.reply(rows(vec![
        row(&["id"], vec![Value::Int(1)]),
        row(&["id"], vec![Value::Int(2)]),
    ]));
    let err = gateway
        .execute_returning(&conn, &statement, &mut author)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Mapping(_)));
    assert_eq!(author, original);
}

#[tokio::test]
async fn delete_without_key_never_reaches_connection() {
    let conn = FakeConnection::new();
    let result = Delete::<Book>::new().eq("title", "x").build();
    assert!(matches!(result, Err(StorageError::PrimaryKey(_))));
    assert!(conn.statements().is_empty());
}

#[tokio::test]
async fn provider_failure_is_an_execution_error() {
    let conn = FakeConnection::new();
    conn.fail("relation \"books\" does not exist");

    let statement = Select::<Book>::new().build().unwrap();
    let err = Gateway::new()
        .fetch::<_, Book>(&conn, &statement)
        .await
        .unwrap_err();

    assert!(err.is_execution());
    match err {
        StorageError::Execution { sql, source } => {
            assert_eq!(sql, statement.sql);
            assert!(source.to_string().contains("does not exist"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(conn.statements().len(), 1);
}

#[tokio::test]
async fn scalar_queries() {
    let conn = FakeConnection::new();
    let gateway = Gateway::new();
    let select_one = BuiltStatement::raw("SELECT 1", vec![]);

    conn.reply(affected(1));
    assert_eq!(gateway.execute(&conn, &select_one).await.unwrap(), 1);

    conn.reply(rows(vec![row(&["?column?"], vec![Value::Int(1)])]));
    let one: i32 = gateway.query_scalar(&conn, &select_one).await.unwrap();
    assert_eq!(one, 1);

    conn.reply(rows(vec![]));
    let err = gateway
        .query_scalar::<_, i64>(&conn, &select_one)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Mapping(_)));

    conn.reply(rows(vec![row(&["a", "b"], vec![Value::Int(1), Value::Int(2)])]));
    let err = gateway
        .query_scalar::<_, i64>(&conn, &select_one)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Mapping(_)));
}

#[tokio::test]
async fn hook_sees_statement_before_execution() {
    let conn = FakeConnection::new();
    let gateway = Gateway::with_hook(RecordingHook::new(conn.events()));

    conn.fail("boom");
    let select_one = BuiltStatement::raw("SELECT 1", vec![]);
    assert!(gateway.execute(&conn, &select_one).await.is_err());
    gateway.execute(&conn, &select_one).await.unwrap();

    let events = conn.events().lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "before SELECT 1",
            "execute SELECT 1",
            "after failed SELECT 1",
            "before SELECT 1",
            "execute SELECT 1",
            "after ok SELECT 1",
        ]
    );
}

#[tokio::test]
async fn dropping_the_future_abandons_the_statement() {
    let conn = FakeConnection::new();
    conn.hang();

    let select_one = BuiltStatement::raw("SELECT pg_sleep(60)", vec![]);
    let gateway = Gateway::new();
    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        gateway.execute(&conn, &select_one),
    )
    .await;

    assert!(outcome.is_err());
    assert!(conn.abandoned());
    assert_eq!(conn.statements().len(), 1);
}

#[tokio::test]
async fn deleting_a_missing_row_reports_zero() {
    let conn = FakeConnection::new();
    let gateway = Gateway::new();
    let statement = Delete::<Book>::new().eq("id", 404).build().unwrap();

    conn.reply(affected(0));
    assert_eq!(gateway.execute(&conn, &statement).await.unwrap(), 0);
    assert_eq!(
        conn.statements(),
        vec![(
            r#"DELETE FROM "books" WHERE "id" = $1"#.to_string(),
            vec![Value::Int(404)]
        )]
    );
}

#[tokio::test]
async fn fetch_optional_rejects_extra_rows_before_loading_relations() {
    let conn = FakeConnection::new();
    conn.reply(rows(vec![book_row(1, "one", 1), book_row(2, "two", 1)]));

    let statement = Select::<Book>::new()
        .relation_with("author", RelationStrategy::Query)
        .build()
        .unwrap();
    let err = Gateway::new()
        .fetch_optional::<_, Book>(&conn, &statement)
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Mapping(_)));
    assert_eq!(conn.sql().len(), 1);
}
