use flowboard_types::async_trait;
use schemars::JsonSchema;
use std::sync::Arc;

use crate::{
    flow::board::{Board, Comment, commands::Command},
    state::FlowboardState,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpsertCommentCommand {
    pub comment: Comment,
    pub old_comment: Option<Comment>,
    pub current_layer: Option<String>,
}

impl UpsertCommentCommand {
    pub fn new(comment: Comment) -> Self {
        UpsertCommentCommand {
            comment,
            old_comment: None,
            current_layer: None,
        }
    }
}

#[async_trait]
impl Command for UpsertCommentCommand {
    async fn execute(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        if self.comment.layer.is_none() {
            self.comment.layer = self.current_layer.clone();
        }

        self.old_comment = board
            .comments
            .insert(self.comment.id.clone(), self.comment.clone());
        Ok(())
    }

    async fn undo(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        match self.old_comment.take() {
            Some(old_comment) => {
                board
                    .comments
                    .insert(old_comment.id.clone(), old_comment);
            }
            None => {
                board.comments.remove(&self.comment.id);
            }
        }
        Ok(())
    }
}
