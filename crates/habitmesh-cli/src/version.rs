pub const FULL: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "+git.",
    env!("HABITMESH_GIT_SHA"),
    env!("HABITMESH_GIT_DIRTY")
);
