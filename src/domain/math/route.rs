//! Cross-pair route search over the pairs known to the client

use std::collections::{HashMap, HashSet, VecDeque};

use rust_decimal::Decimal;
use tracing::debug;

use super::constant_product::{ConstantProductMath, Fee, PoolState};
use crate::shared::errors::DexError;
use crate::shared::types::Address;

pub const DEFAULT_MAX_HOPS: usize = 3;

/// Reserves of one pair in token units, ordered as the pair reports its roots
#[derive(Debug, Clone, PartialEq)]
pub struct PairLiquidity {
    pub pair: Address,
    pub left_root: Address,
    pub right_root: Address,
    pub left_reserve: Decimal,
    pub right_reserve: Decimal,
    pub fee: Fee,
}

impl PairLiquidity {
    /// Pool state for swapping from `spent_root`
    pub fn direction(&self, spent_root: &Address) -> Option<PoolState> {
        if spent_root == &self.left_root {
            Some(PoolState::new(self.left_reserve, self.right_reserve, self.fee))
        } else if spent_root == &self.right_root {
            Some(PoolState::new(self.right_reserve, self.left_reserve, self.fee))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteHop {
    pub pair: Address,
    pub spent_root: Address,
    pub receive_root: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRoute {
    pub hops: Vec<RouteHop>,
}

impl SwapRoute {
    pub fn is_direct(&self) -> bool {
        self.hops.len() == 1
    }

    /// Token roots visited after the first one
    pub fn next_roots(&self) -> Vec<Address> {
        self.hops.iter().map(|hop| hop.receive_root.clone()).collect()
    }
}

/// Route with its locally estimated output
#[derive(Debug, Clone, PartialEq)]
pub struct RouteQuote {
    pub route: SwapRoute,
    pub amount_out: Decimal,
    /// Output of every hop, in order
    pub steps: Vec<Decimal>,
}

#[derive(Debug, Clone)]
struct Edge {
    token: Address,
    pair: Address,
}

/// Token connectivity through pairs
#[derive(Debug, Clone, Default)]
pub struct TokenGraph {
    adjacency: HashMap<Address, Vec<Edge>>,
    pairs: HashMap<Address, PairLiquidity>,
}

impl TokenGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pair(&mut self, liquidity: PairLiquidity) {
        if self.pairs.contains_key(&liquidity.pair) {
            self.pairs.insert(liquidity.pair.clone(), liquidity);
            return;
        }
        self.add_edge(&liquidity.left_root, &liquidity.right_root, &liquidity.pair);
        self.add_edge(&liquidity.right_root, &liquidity.left_root, &liquidity.pair);
        self.pairs.insert(liquidity.pair.clone(), liquidity);
    }

    fn add_edge(&mut self, from: &Address, to: &Address, pair: &Address) {
        self.adjacency.entry(from.clone()).or_default().push(Edge {
            token: to.clone(),
            pair: pair.clone(),
        });
    }

    pub fn pair(&self, address: &Address) -> Option<&PairLiquidity> {
        self.pairs.get(address)
    }

    /// All simple routes from `start` to `target` with at most `max_hops` pairs
    pub fn find_routes(&self, start: &Address, target: &Address, max_hops: usize) -> Vec<SwapRoute> {
        if start == target {
            return Vec::new();
        }
        let mut results = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back((start.clone(), Vec::<RouteHop>::new(), HashSet::from([start.clone()])));

        while let Some((current, hops, visited)) = queue.pop_front() {
            if hops.len() >= max_hops {
                continue;
            }
            let Some(edges) = self.adjacency.get(&current) else {
                continue;
            };
            for edge in edges {
                if visited.contains(&edge.token) {
                    continue;
                }
                let mut next_hops = hops.clone();
                next_hops.push(RouteHop {
                    pair: edge.pair.clone(),
                    spent_root: current.clone(),
                    receive_root: edge.token.clone(),
                });
                if &edge.token == target {
                    results.push(SwapRoute { hops: next_hops });
                } else {
                    let mut next_visited = visited.clone();
                    next_visited.insert(edge.token.clone());
                    queue.push_back((edge.token.clone(), next_hops, next_visited));
                }
            }
        }
        results
    }

    /// Chain the constant-product estimate through every hop of `route`
    pub fn quote_route(&self, route: &SwapRoute, amount_in: Decimal) -> Result<RouteQuote, DexError> {
        let mut amount = amount_in;
        let mut steps = Vec::with_capacity(route.hops.len());
        for hop in &route.hops {
            let pool = self
                .pairs
                .get(&hop.pair)
                .and_then(|pair| pair.direction(&hop.spent_root))
                .ok_or(DexError::RouteNotFound)?;
            amount = ConstantProductMath::expected_output(amount, &pool)?;
            steps.push(amount);
        }
        Ok(RouteQuote {
            route: route.clone(),
            amount_out: amount,
            steps,
        })
    }

    /// Route with the highest estimated output
    pub fn best_route(
        &self,
        start: &Address,
        target: &Address,
        amount_in: Decimal,
        max_hops: usize,
    ) -> Result<RouteQuote, DexError> {
        let quotes: Vec<RouteQuote> = self
            .find_routes(start, target, max_hops)
            .iter()
            .filter_map(|route| match self.quote_route(route, amount_in) {
                Ok(quote) => Some(quote),
                Err(error) => {
                    debug!(hops = route.hops.len(), %error, "route cannot be quoted");
                    None
                }
            })
            .collect();

        quotes
            .into_iter()
            .max_by(|a, b| {
                a.amount_out
                    .cmp(&b.amount_out)
                    .then_with(|| b.route.hops.len().cmp(&a.route.hops.len()))
            })
            .ok_or(DexError::RouteNotFound)
    }
}
