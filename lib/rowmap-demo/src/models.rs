use rowmap::Record;

pub const CREATE_AUTHORS: &str = "CREATE TABLE IF NOT EXISTS authors (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL
)";

pub const CREATE_BOOKS: &str = "CREATE TABLE IF NOT EXISTS books (
    id BIGSERIAL PRIMARY KEY,
    title TEXT NOT NULL,
    author_id BIGINT NOT NULL REFERENCES authors (id)
)";

#[derive(Debug, Clone, Default, PartialEq, Record)]
#[record(table = "authors", alias = "author")]
pub struct Author {
    #[column(primary_key)]
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Record)]
#[record(table = "books", alias = "book")]
pub struct Book {
    #[column(primary_key)]
    pub id: i64,
    pub title: String,
    pub author_id: i64,
    #[belongs_to(key = author_id, references = id)]
    pub author: Option<Author>,
}
