use crate::actor::CoordinatorHandle;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) coordinator: CoordinatorHandle,
}
