/// Config for an injector
/// ## Fields
/// - `close_on_drop`:
///   If `true`, pending resources of the injector's own frame are torn down when the last handle
///   to the injector is dropped.
///
///   Async resources can't be awaited on drop, they are released without being closed.
///   Call `close` explicitly to tear them down.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub close_on_drop: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self { close_on_drop: true }
    }
}
