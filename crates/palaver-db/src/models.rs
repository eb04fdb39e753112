/// A registered user. `keyword` is the primary identity; `nickname` is the
/// display name. The password is stored and compared verbatim.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub keyword: String,
    pub nickname: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ChatRow {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub sender: String,
    pub content: String,
}
