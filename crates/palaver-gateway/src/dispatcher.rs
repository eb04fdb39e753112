use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use palaver_db::Store;
use palaver_types::Error;
use palaver_types::api::{
    Ack, AddUsersRequest, ChatIdRequest, ChatListReply, ChatSummary, CreateChatReply,
    CreateChatRequest, ErrorReply, LoginReply, LoginRequest, MessageView, MessagesReply,
    RegisterRequest, SendMessageRequest, Status,
};
use palaver_types::events::ServerEvent;

use crate::broadcast::Broadcaster;
use crate::registry::{ConnId, SessionRegistry};

/// Stateless per-request protocol state machine. Preconditions are checked
/// in a fixed order: frame decode, action tag, payload fields, identity,
/// membership — so an invalid request never has partial side effects.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<Store>,
    registry: SessionRegistry,
    broadcaster: Broadcaster,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>, registry: SessionRegistry, broadcaster: Broadcaster) -> Self {
        Self {
            store,
            registry,
            broadcaster,
        }
    }

    /// Handle one complete framed line. Returns the reply line, if the
    /// action produces one. Errors become error replies here; none escape
    /// to the connection loop.
    pub async fn dispatch(&self, conn: ConnId, line: &str) -> Option<String> {
        match self.dispatch_inner(conn, line).await {
            Ok(reply) => reply,
            Err(e) => {
                match &e {
                    Error::MalformedFrame(detail) => {
                        warn!("connection {}: dropped malformed frame: {}", conn, detail)
                    }
                    Error::Internal(detail) => {
                        error!("connection {}: internal error: {}", conn, detail)
                    }
                    other => debug!("connection {}: rejected request: {}", conn, other),
                }
                Some(to_line(&ErrorReply::new(e.to_string())))
            }
        }
    }

    async fn dispatch_inner(&self, conn: ConnId, line: &str) -> Result<Option<String>, Error> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| Error::MalformedFrame(e.to_string()))?;
        let action = value
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("action".into()))?
            .to_string();

        match action.as_str() {
            "register" => self.register(payload(value)?).map(Some),
            "login" => self.login(conn, payload(value)?).await.map(Some),
            "send_message" => self.send_message(conn, payload(value)?).await,
            "get_chats" => self.get_chats(conn).await.map(Some),
            "create_chat" => self.create_chat(conn, payload(value)?).await.map(Some),
            "add_users_to_chat" => self.add_users(conn, payload(value)?).await.map(Some),
            "leave_chat" => self.leave_chat(conn, payload(value)?).await.map(Some),
            "delete_chat" => self.delete_chat(conn, payload(value)?).await.map(Some),
            "get_chat_messages" => self.get_chat_messages(conn, payload(value)?).await.map(Some),
            other => Err(Error::UnknownAction(other.to_string())),
        }
    }

    // -- Actions --

    fn register(&self, req: RegisterRequest) -> Result<String, Error> {
        require_filled(&[
            ("keyword", &req.keyword),
            ("nickname", &req.nickname),
            ("password", &req.password),
        ])?;

        self.store
            .register(&req.keyword, &req.nickname, &req.password)?;
        info!("registered @{} ({})", req.keyword, req.nickname);
        Ok(to_line(&Ack::ok()))
    }

    async fn login(&self, conn: ConnId, req: LoginRequest) -> Result<String, Error> {
        require_filled(&[("keyword", &req.keyword), ("password", &req.password)])?;

        // No session is bound unless authentication succeeds.
        let user = self.store.authenticate(&req.keyword, &req.password)?;
        self.registry.bind(conn, &user.keyword).await;
        info!("connection {}: @{} logged in", conn, user.keyword);
        Ok(to_line(&LoginReply {
            status: Status::Ok,
            nickname: user.nickname,
        }))
    }

    async fn send_message(
        &self,
        conn: ConnId,
        req: SendMessageRequest,
    ) -> Result<Option<String>, Error> {
        let keyword = self.identity(conn).await?;
        require_filled(&[("chat_id", &req.chat_id), ("message", &req.message)])?;
        self.require_member(&req.chat_id, &keyword)?;

        self.store
            .append_message(&req.chat_id, &keyword, &req.message)?;
        self.broadcaster
            .broadcast(
                &req.chat_id,
                &ServerEvent::NewMessage {
                    chat_id: req.chat_id.clone(),
                    from: keyword,
                    message: req.message,
                },
            )
            .await;
        Ok(None)
    }

    async fn get_chats(&self, conn: ConnId) -> Result<String, Error> {
        let keyword = self.identity(conn).await?;
        let chats = self
            .store
            .chats_of(&keyword)?
            .into_iter()
            .map(|chat| ChatSummary {
                id: chat.id,
                name: chat.name,
            })
            .collect();
        Ok(to_line(&ChatListReply {
            status: Status::Ok,
            chats,
        }))
    }

    async fn create_chat(&self, conn: ConnId, req: CreateChatRequest) -> Result<String, Error> {
        let keyword = self.identity(conn).await?;
        require_filled(&[("name", &req.name)])?;

        // The caller is always a member of the chat they create.
        let mut members = req.members;
        if !members.contains(&keyword) {
            members.push(keyword.clone());
        }

        let chat_id = self.store.create_chat(&req.name, &members)?;
        info!("chat {} ({:?}) created by @{}", chat_id, req.name, keyword);

        for member in &members {
            self.broadcaster
                .notify(member, &ServerEvent::ChatListUpdated)
                .await;
        }
        Ok(to_line(&CreateChatReply {
            status: Status::Ok,
            chat_id,
        }))
    }

    async fn add_users(&self, conn: ConnId, req: AddUsersRequest) -> Result<String, Error> {
        let keyword = self.identity(conn).await?;
        require_filled(&[("chat_id", &req.chat_id)])?;
        if req.users.is_empty() {
            return Err(Error::Validation("users".into()));
        }
        let current = self.require_member(&req.chat_id, &keyword)?;

        // Members already present are skipped silently; only the genuinely
        // new ones get a chat-list notification.
        let added: Vec<String> = req
            .users
            .iter()
            .filter(|user| !current.contains(*user))
            .cloned()
            .collect();

        self.store.add_members(&req.chat_id, &req.users)?;
        for member in &added {
            self.broadcaster
                .notify(member, &ServerEvent::ChatListUpdated)
                .await;
        }
        Ok(to_line(&Ack::ok()))
    }

    async fn leave_chat(&self, conn: ConnId, req: ChatIdRequest) -> Result<String, Error> {
        let keyword = self.identity(conn).await?;
        require_filled(&[("chat_id", &req.chat_id)])?;
        // Leaving a chat you are not in is a hard error, unlike the
        // silently idempotent add.
        self.require_member(&req.chat_id, &keyword)?;

        self.store.remove_member(&req.chat_id, &keyword)?;
        info!("@{} left chat {}", keyword, req.chat_id);
        self.broadcaster
            .notify(&keyword, &ServerEvent::ChatListUpdated)
            .await;
        Ok(to_line(&Ack::ok()))
    }

    async fn delete_chat(&self, conn: ConnId, req: ChatIdRequest) -> Result<String, Error> {
        let keyword = self.identity(conn).await?;
        require_filled(&[("chat_id", &req.chat_id)])?;
        let members = self.require_member(&req.chat_id, &keyword)?;

        self.store.delete_chat(&req.chat_id)?;
        info!("chat {} deleted by @{}", req.chat_id, keyword);

        for member in &members {
            self.broadcaster
                .notify(member, &ServerEvent::ChatListUpdated)
                .await;
        }
        Ok(to_line(&Ack::ok()))
    }

    async fn get_chat_messages(&self, conn: ConnId, req: ChatIdRequest) -> Result<String, Error> {
        let keyword = self.identity(conn).await?;
        require_filled(&[("chat_id", &req.chat_id)])?;
        self.require_member(&req.chat_id, &keyword)?;

        let messages = self
            .store
            .messages_of(&req.chat_id)?
            .into_iter()
            .map(|message| MessageView {
                from: message.sender,
                message: message.content,
            })
            .collect();
        Ok(to_line(&MessagesReply {
            status: Status::Ok,
            messages,
        }))
    }

    // -- Preconditions --

    async fn identity(&self, conn: ConnId) -> Result<String, Error> {
        self.registry
            .identity_of(conn)
            .await
            .ok_or(Error::Unauthenticated)
    }

    /// Non-members are rejected outright, never handed empty results. A
    /// chat id that does not exist has no members, so it rejects the same
    /// way.
    fn require_member(&self, chat_id: &str, keyword: &str) -> Result<HashSet<String>, Error> {
        let members = self.store.members_of(chat_id)?;
        if !members.contains(keyword) {
            return Err(Error::Forbidden);
        }
        Ok(members)
    }
}

fn payload<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    serde_json::from_value(value).map_err(|e| Error::Validation(e.to_string()))
}

fn require_filled(fields: &[(&str, &str)]) -> Result<(), Error> {
    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(Error::Validation((*name).to_string()));
        }
    }
    Ok(())
}

fn to_line<T: Serialize>(reply: &T) -> String {
    serde_json::to_string(reply).unwrap()
}
