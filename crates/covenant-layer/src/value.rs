use covenant_ir::HasBottom;

/// Abstract state or value with widening and narrowing.
///
/// ## Algebraic contracts
///
/// **Widening**: `x ⊑ widen(x, y)` and `y ⊑ widen(x, y)`, and every chain
/// `x₀, widen(x₀, x₁), widen(widen(x₀, x₁), x₂), ...` stabilizes after
/// finitely many steps. Finite-height lattices may widen by joining.
///
/// **Narrowing**: `x ⊓ y ⊑ narrow(x, y) ⊑ x`.
pub trait AbstractValue: HasBottom {
    fn widen(&self, next: &Self) -> Self;

    /// Default: no refinement.
    fn narrow(&self, _next: &Self) -> Self
    where
        Self: Clone,
    {
        self.clone()
    }

    /// Whether this is the unreachable state. Analyses never propagate a
    /// bottom state along an edge.
    fn is_bottom(&self) -> bool
    where
        Self: Sized,
    {
        self.is_subseteq(&Self::bottom())
    }
}
