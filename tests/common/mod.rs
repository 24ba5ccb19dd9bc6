use std::sync::Arc;
use uuid::Uuid;

use carelink_messaging::config::Config;
use carelink_messaging::models::ConversationType;
use carelink_messaging::services::conversation_service::{
    ConversationService, CreateConversation,
};
use carelink_messaging::services::directory::{
    ChildAccess, ChildRoles, StaticChildAccess, StaticDirectory, UserDirectory,
};
use carelink_messaging::AppState;

pub struct TestWorld {
    pub state: AppState,
    pub child_access: Arc<StaticChildAccess>,
    pub directory: Arc<StaticDirectory>,
}

/// Fresh state with an in-memory child-access table and directory.
pub fn world() -> TestWorld {
    let child_access = StaticChildAccess::new();
    let directory = StaticDirectory::new();
    let state = AppState::new(
        Config::test_defaults(),
        child_access.clone() as Arc<dyn ChildAccess>,
        directory.clone() as Arc<dyn UserDirectory>,
    );
    TestWorld {
        state,
        child_access,
        directory,
    }
}

/// Creates a direct conversation between `a` and `b` about `child`,
/// granting `a` (the creator) a caregiver role first.
pub async fn direct_conversation(world: &TestWorld, a: Uuid, b: Uuid, child: Uuid) -> Uuid {
    world.child_access.grant(a, child, ChildRoles::caregiver()).await;
    let outcome = ConversationService::create(
        &world.state.store,
        &world.state.config,
        world.child_access.as_ref(),
        CreateConversation {
            participants: vec![a, b],
            child_id: child,
            kind: ConversationType::Direct,
            title: "Care updates".into(),
            created_by: a,
        },
    )
    .await
    .expect("create direct conversation");
    assert!(!outcome.is_existing);
    outcome.conversation_id
}
