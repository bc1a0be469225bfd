/// One line read from a topic's `in` pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLine {
    /// Topic whose pipe the line came from; empty for the server session.
    pub topic: String,
    pub text: String,
}
