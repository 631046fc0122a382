use flowboard_types::async_trait;
use schemars::JsonSchema;
use std::sync::Arc;

use crate::{
    flow::board::{Board, Comment, commands::Command},
    state::FlowboardState,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct RemoveCommentCommand {
    pub comment: Comment,
}

impl RemoveCommentCommand {
    pub fn new(comment: Comment) -> Self {
        RemoveCommentCommand { comment }
    }
}

#[async_trait]
impl Command for RemoveCommentCommand {
    async fn execute(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        if let Some(comment) = board.comments.remove(&self.comment.id) {
            self.comment = comment;
        }
        Ok(())
    }

    async fn undo(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        board
            .comments
            .insert(self.comment.id.clone(), self.comment.clone());
        Ok(())
    }
}
