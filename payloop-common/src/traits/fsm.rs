/// A state that moves to its successor when fed an input.
///
/// Implementations keep transitions pure: the only side effect allowed is on
/// the supplied context, so a transition table can be tested without any I/O.
pub trait FiniteStateMachine {
    type Input;
    type Context;

    #[must_use]
    fn transition(self, input: Self::Input, context: &mut Self::Context) -> Self;
}
