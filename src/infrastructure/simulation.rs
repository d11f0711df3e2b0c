//! In-memory DEX: constant-product pairs, token wallets and DEX accounts
//! answering the getters and messages the stores use.
//!
//! Backs the `simulate-swap` command and the integration tests.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::domain::math::{mul_div, Fee};
use crate::infrastructure::provider::{ContractState, MemoryProvider, OutgoingMessage};
use crate::shared::errors::ProviderError;
use crate::shared::types::{Address, Token};

const CONTRACT_BALANCE: u128 = 1_000_000_000;

#[derive(Debug, Clone)]
struct SimulatedPair {
    address: Address,
    left_root: Address,
    right_root: Address,
    lp_root: Address,
    left_reserve: u128,
    right_reserve: u128,
    lp_supply: u128,
    fee: Fee,
}

impl SimulatedPair {
    fn reserves_for(&self, spent_root: &Address) -> Option<(u128, u128)> {
        if spent_root == &self.left_root {
            Some((self.left_reserve, self.right_reserve))
        } else if spent_root == &self.right_root {
            Some((self.right_reserve, self.left_reserve))
        } else {
            None
        }
    }

    fn counterpart(&self, root: &Address) -> Option<&Address> {
        if root == &self.left_root {
            Some(&self.right_root)
        } else if root == &self.right_root {
            Some(&self.left_root)
        } else {
            None
        }
    }

    /// Output and fee for spending `amount` of `spent_root`
    fn exchange_output(&self, amount: u128, spent_root: &Address) -> Option<(u128, u128)> {
        let (reserve_in, reserve_out) = self.reserves_for(spent_root)?;
        let fee = mul_div(amount, self.fee.numerator as u128, self.fee.denominator as u128).ok()?;
        let amount_after_fee = amount - fee;
        let output = mul_div(amount_after_fee, reserve_out, reserve_in.checked_add(amount_after_fee)?).ok()?;
        (output < reserve_out).then_some((output, fee))
    }

    fn spend_input(&self, receive_amount: u128, receive_root: &Address) -> Option<(u128, u128)> {
        let spent_root = self.counterpart(receive_root)?;
        let (reserve_in, reserve_out) = self.reserves_for(spent_root)?;
        if receive_amount >= reserve_out {
            return None;
        }
        let after_fee = mul_div(reserve_in, receive_amount, reserve_out - receive_amount).ok()? + 1;
        let kept = self.fee.denominator as u128 - self.fee.numerator as u128;
        let amount = mul_div(after_fee, self.fee.denominator as u128, kept).ok()? + 1;
        Some((amount, amount - after_fee))
    }

    fn apply_exchange(&mut self, spent_root: &Address, amount: u128, output: u128) {
        if spent_root == &self.left_root {
            self.left_reserve += amount;
            self.right_reserve -= output;
        } else {
            self.right_reserve += amount;
            self.left_reserve -= output;
        }
    }

    fn lp_reward(&self, left_amount: u128, right_amount: u128) -> Option<u128> {
        if self.lp_supply == 0 {
            return Some(left_amount.max(right_amount));
        }
        let by_left = mul_div(left_amount, self.lp_supply, self.left_reserve).ok()?;
        let by_right = mul_div(right_amount, self.lp_supply, self.right_reserve).ok()?;
        Some(by_left.min(by_right))
    }

    fn withdraw_amounts(&self, lp_amount: u128) -> Option<(u128, u128)> {
        if self.lp_supply == 0 || lp_amount > self.lp_supply {
            return None;
        }
        Some((
            mul_div(lp_amount, self.left_reserve, self.lp_supply).ok()?,
            mul_div(lp_amount, self.right_reserve, self.lp_supply).ok()?,
        ))
    }
}

#[derive(Default)]
struct DexState {
    next_seed: u64,
    tokens: HashMap<Address, Token>,
    wallets: HashMap<(Address, Address), Address>,
    wallet_info: HashMap<Address, (Address, Address)>,
    balances: HashMap<Address, u128>,
    pairs: HashMap<Address, SimulatedPair>,
    accounts: HashMap<Address, Address>,
    account_owners: HashMap<Address, Address>,
    account_balances: HashMap<(Address, Address), u128>,
    /// Wallets credited since the last deploy pass
    credited: Vec<Address>,
}

impl DexState {
    fn next_address(&mut self) -> Address {
        self.next_seed += 1;
        synthetic_address(self.next_seed)
    }

    fn wallet_of(&mut self, root: &Address, owner: &Address) -> Address {
        if let Some(wallet) = self.wallets.get(&(root.clone(), owner.clone())) {
            return wallet.clone();
        }
        let wallet = self.next_address();
        self.wallets.insert((root.clone(), owner.clone()), wallet.clone());
        self.wallet_info.insert(wallet.clone(), (root.clone(), owner.clone()));
        wallet
    }

    fn credit(&mut self, root: &Address, owner: &Address, amount: u128) -> Address {
        let wallet = self.wallet_of(root, owner);
        *self.balances.entry(wallet.clone()).or_default() += amount;
        self.credited.push(wallet.clone());
        wallet
    }

    fn pair_between(&self, a: &Address, b: &Address) -> Option<&SimulatedPair> {
        self.pairs.values().find(|pair| {
            (&pair.left_root == a && &pair.right_root == b) || (&pair.left_root == b && &pair.right_root == a)
        })
    }

    fn pair_by_lp_root(&self, lp_root: &Address) -> Option<Address> {
        self.pairs
            .values()
            .find(|pair| &pair.lp_root == lp_root)
            .map(|pair| pair.address.clone())
    }
}

/// Deterministic address for simulated contracts
pub fn synthetic_address(seed: u64) -> Address {
    let mut account = [0u8; 32];
    account[24..].copy_from_slice(&seed.to_be_bytes());
    Address::new(0, account)
}

fn deploy_wallets(provider: &MemoryProvider, wallets: &[Address]) {
    for wallet in wallets {
        provider.set_contract_state(
            wallet,
            ContractState {
                balance: CONTRACT_BALANCE,
                is_deployed: true,
                code_hash: None,
            },
        );
    }
}

fn rejected(message: impl Into<String>) -> ProviderError {
    ProviderError::new(60, message)
}

fn amount_field(input: &Value, name: &str) -> Option<u128> {
    match input.get(name)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64().map(u128::from),
        _ => None,
    }
}

fn address_field(input: &Value, name: &str) -> Option<Address> {
    input.get(name)?.as_str()?.parse().ok()
}

fn id_field(input: &Value, name: &str) -> Value {
    match input.get(name) {
        Some(Value::String(s)) => s.parse::<u64>().map(Value::from).unwrap_or_else(|_| Value::String(s.clone())),
        Some(other) => other.clone(),
        None => Value::Null,
    }
}

/// Simulated DEX living on a [`MemoryProvider`]
#[derive(Clone)]
pub struct DexSimulator {
    provider: Arc<MemoryProvider>,
    state: Arc<Mutex<DexState>>,
    dex_root: Address,
}

impl DexSimulator {
    pub fn new(provider: Arc<MemoryProvider>) -> Self {
        let mut state = DexState::default();
        let dex_root = state.next_address();
        let simulator = Self {
            provider,
            state: Arc::new(Mutex::new(state)),
            dex_root,
        };
        simulator.install_getters();
        simulator.install_message_handlers();
        simulator
    }

    pub fn provider(&self) -> &Arc<MemoryProvider> {
        &self.provider
    }

    pub fn dex_root(&self) -> &Address {
        &self.dex_root
    }

    pub fn add_token(&self, symbol: &str, decimals: u8) -> Token {
        let mut state = self.state.lock();
        let root = state.next_address();
        let token = Token::new(root.clone(), symbol, decimals);
        state.tokens.insert(root, token.clone());
        token
    }

    /// Create a pair with initial reserves; returns its address
    pub fn add_pair(&self, left: &Token, right: &Token, left_reserve: u128, right_reserve: u128, fee: Fee) -> Address {
        let mut state = self.state.lock();
        let address = state.next_address();
        let lp_root = state.next_address();
        let lp_token = Token::new(lp_root.clone(), format!("{}-{}-LP", left.symbol, right.symbol), 9);
        state.tokens.insert(lp_root.clone(), lp_token);
        let lp_supply = left_reserve.max(right_reserve);
        state.pairs.insert(
            address.clone(),
            SimulatedPair {
                address: address.clone(),
                left_root: left.root.clone(),
                right_root: right.root.clone(),
                lp_root,
                left_reserve,
                right_reserve,
                lp_supply,
                fee,
            },
        );
        drop(state);
        self.deploy(&address);
        address
    }

    pub fn lp_root(&self, pair: &Address) -> Option<Address> {
        self.state.lock().pairs.get(pair).map(|pair| pair.lp_root.clone())
    }

    /// Set pair reserves and LP supply directly
    pub fn set_reserves(&self, pair: &Address, left_reserve: u128, right_reserve: u128, lp_supply: u128) {
        if let Some(pair) = self.state.lock().pairs.get_mut(pair) {
            pair.left_reserve = left_reserve;
            pair.right_reserve = right_reserve;
            pair.lp_supply = lp_supply;
        }
    }

    pub fn reserves(&self, pair: &Address) -> Option<(u128, u128, u128)> {
        self.state
            .lock()
            .pairs
            .get(pair)
            .map(|pair| (pair.left_reserve, pair.right_reserve, pair.lp_supply))
    }

    /// Credit `amount` of `token` to the wallet owned by `owner`
    pub fn mint(&self, token: &Address, owner: &Address, amount: u128) -> Address {
        let wallet = {
            let mut state = self.state.lock();
            let wallet = state.credit(token, owner, amount);
            state.credited.clear();
            if let Some(pair_address) = state.pair_by_lp_root(token) {
                if let Some(pair) = state.pairs.get_mut(&pair_address) {
                    pair.lp_supply += amount;
                }
            }
            wallet
        };
        self.deploy(&wallet);
        wallet
    }

    pub fn balance(&self, token: &Address, owner: &Address) -> u128 {
        let state = self.state.lock();
        state
            .wallets
            .get(&(token.clone(), owner.clone()))
            .and_then(|wallet| state.balances.get(wallet))
            .copied()
            .unwrap_or_default()
    }

    /// Deploy the DEX account of `owner`
    pub fn deploy_account(&self, owner: &Address) -> Address {
        let account = {
            let mut state = self.state.lock();
            let account = match state.accounts.get(owner) {
                Some(account) => account.clone(),
                None => state.next_address(),
            };
            state.accounts.insert(owner.clone(), account.clone());
            state.account_owners.insert(account.clone(), owner.clone());
            account
        };
        self.deploy(&account);
        account
    }

    pub fn account_deposit(&self, owner: &Address, token: &Address, amount: u128) {
        let mut state = self.state.lock();
        if let Some(account) = state.accounts.get(owner).cloned() {
            *state.account_balances.entry((account, token.clone())).or_default() += amount;
        }
    }

    fn deploy(&self, address: &Address) {
        self.provider.set_contract_state(
            address,
            ContractState {
                balance: CONTRACT_BALANCE,
                is_deployed: true,
                code_hash: None,
            },
        );
    }

    fn install_getters(&self) {
        let provider = &self.provider;

        let state = self.state.clone();
        provider.on_call("walletOf", move |root, input| {
            let owner = address_field(input, "walletOwner").ok_or_else(|| rejected("walletOwner is required"))?;
            let mut state = state.lock();
            if !state.tokens.contains_key(root) {
                return Err(rejected(format!("{} is not a token root", root)));
            }
            Ok(json!({ "value0": state.wallet_of(root, &owner) }))
        });

        let state = self.state.clone();
        provider.on_call("balance", move |wallet, _| {
            let state = state.lock();
            let balance = state.balances.get(wallet).copied().unwrap_or_default();
            Ok(json!({ "value0": balance.to_string() }))
        });

        let state = self.state.clone();
        provider.on_call("getExpectedPairAddress", move |_, input| {
            let left = address_field(input, "left_root").ok_or_else(|| rejected("left_root is required"))?;
            let right = address_field(input, "right_root").ok_or_else(|| rejected("right_root is required"))?;
            let state = state.lock();
            let address = state
                .pair_between(&left, &right)
                .map(|pair| pair.address.clone())
                .unwrap_or_else(|| synthetic_address(u64::MAX));
            Ok(json!({ "value0": address }))
        });

        let state = self.state.clone();
        provider.on_call("getExpectedAccountAddress", move |_, input| {
            let owner = address_field(input, "account_owner").ok_or_else(|| rejected("account_owner is required"))?;
            let mut state = state.lock();
            let account = match state.accounts.get(&owner) {
                Some(account) => account.clone(),
                None => {
                    let account = state.next_address();
                    state.accounts.insert(owner.clone(), account.clone());
                    state.account_owners.insert(account.clone(), owner);
                    account
                }
            };
            Ok(json!({ "value0": account }))
        });

        let state = self.state.clone();
        provider.on_call("getWalletData", move |account, input| {
            let root = address_field(input, "token_root").ok_or_else(|| rejected("token_root is required"))?;
            let mut state = state.lock();
            let owner = state
                .account_owners
                .get(account)
                .cloned()
                .ok_or_else(|| rejected("unknown account"))?;
            let balance = state
                .account_balances
                .get(&(account.clone(), root.clone()))
                .copied()
                .unwrap_or_default();
            let wallet = state.wallet_of(&root, &owner);
            Ok(json!({ "wallet": wallet, "balance": balance.to_string() }))
        });

        self.install_pair_getters();
    }

    fn install_pair_getters(&self) {
        let provider = &self.provider;
        let with_pair = |state: &Arc<Mutex<DexState>>, address: &Address| -> Result<SimulatedPair, ProviderError> {
            state
                .lock()
                .pairs
                .get(address)
                .cloned()
                .ok_or_else(|| rejected(format!("{} is not a pair", address)))
        };

        let state = self.state.clone();
        provider.on_call("getTokenRoots", move |address, _| {
            let pair = with_pair(&state, address)?;
            Ok(json!({ "left": pair.left_root, "right": pair.right_root, "lp": pair.lp_root }))
        });

        let state = self.state.clone();
        provider.on_call("getTokenWallets", move |address, _| {
            let pair = with_pair(&state, address)?;
            let mut state = state.lock();
            Ok(json!({
                "left": state.wallet_of(&pair.left_root, address),
                "right": state.wallet_of(&pair.right_root, address),
                "lp": state.wallet_of(&pair.lp_root, address),
            }))
        });

        let state = self.state.clone();
        provider.on_call("getBalances", move |address, _| {
            let pair = with_pair(&state, address)?;
            Ok(json!({ "value0": {
                "lp_supply": pair.lp_supply.to_string(),
                "left_balance": pair.left_reserve.to_string(),
                "right_balance": pair.right_reserve.to_string(),
            }}))
        });

        let state = self.state.clone();
        provider.on_call("getFeeParams", move |address, _| {
            let pair = with_pair(&state, address)?;
            Ok(json!({ "value0": {
                "denominator": pair.fee.denominator.to_string(),
                "pool_numerator": pair.fee.numerator.to_string(),
                "beneficiary_numerator": "0",
            }}))
        });

        let state = self.state.clone();
        provider.on_call("expectedExchange", move |address, input| {
            let pair = with_pair(&state, address)?;
            let amount = amount_field(input, "amount").ok_or_else(|| rejected("amount is required"))?;
            let spent = address_field(input, "spent_token_root").ok_or_else(|| rejected("spent_token_root is required"))?;
            let (expected, fee) = pair
                .exchange_output(amount, &spent)
                .ok_or_else(|| rejected("insufficient liquidity"))?;
            Ok(json!({ "expected_amount": expected.to_string(), "expected_fee": fee.to_string() }))
        });

        let state = self.state.clone();
        provider.on_call("expectedSpendAmount", move |address, input| {
            let pair = with_pair(&state, address)?;
            let amount = amount_field(input, "receive_amount").ok_or_else(|| rejected("receive_amount is required"))?;
            let root = address_field(input, "receive_token_root").ok_or_else(|| rejected("receive_token_root is required"))?;
            let (spent, fee) = pair
                .spend_input(amount, &root)
                .ok_or_else(|| rejected("insufficient liquidity"))?;
            Ok(json!({ "expected_amount": spent.to_string(), "expected_fee": fee.to_string() }))
        });

        let state = self.state.clone();
        provider.on_call("expectedWithdrawLiquidity", move |address, input| {
            let pair = with_pair(&state, address)?;
            let lp_amount = amount_field(input, "lp_amount").ok_or_else(|| rejected("lp_amount is required"))?;
            let (left, right) = pair
                .withdraw_amounts(lp_amount)
                .ok_or_else(|| rejected("lp amount exceeds supply"))?;
            Ok(json!({ "expected_left_amount": left.to_string(), "expected_right_amount": right.to_string() }))
        });

        let state = self.state.clone();
        provider.on_call("expectedDepositLiquidity", move |address, input| {
            let pair = with_pair(&state, address)?;
            let left = amount_field(input, "left_amount").unwrap_or_default();
            let right = amount_field(input, "right_amount").unwrap_or_default();
            let reward = pair.lp_reward(left, right).ok_or_else(|| rejected("cannot compute lp reward"))?;
            Ok(json!({ "lp_reward": reward.to_string() }))
        });

        provider.on_call("buildExchangePayloadV2", |_, input| {
            Ok(json!({ "value0": {
                "op": "exchange",
                "id": id_field(input, "_id"),
                "expected_amount": input.get("_expectedAmount").cloned().unwrap_or(Value::Null),
                "recipient": input.get("_recipient").cloned().unwrap_or(Value::Null),
            }}))
        });

        provider.on_call("buildCrossPairExchangePayloadV2", |_, input| {
            Ok(json!({ "value0": {
                "op": "cross",
                "id": id_field(input, "_id"),
                "expected_amount": input.get("_expectedAmount").cloned().unwrap_or(Value::Null),
                "outcoming": input.get("_outcoming").cloned().unwrap_or(Value::Null),
                "steps": input.get("_steps").cloned().unwrap_or(Value::Null),
                "recipient": input.get("_recipient").cloned().unwrap_or(Value::Null),
            }}))
        });

        provider.on_call("buildWithdrawLiquidityPayloadV2", |_, input| {
            Ok(json!({ "value0": {
                "op": "withdraw",
                "id": id_field(input, "_id"),
                "expected_left_amount": input.get("_expectedLeftAmount").cloned().unwrap_or(Value::Null),
                "expected_right_amount": input.get("_expectedRightAmount").cloned().unwrap_or(Value::Null),
                "recipient": input.get("_recipient").cloned().unwrap_or(Value::Null),
            }}))
        });
    }

    fn install_message_handlers(&self) {
        let state = self.state.clone();
        self.provider.on_any_send(move |provider, message| match message.call.method.as_str() {
            "transfer" => handle_transfer(&state, provider, message),
            "depositLiquidityV2" => handle_deposit(&state, provider, message),
            _ => {}
        });
    }
}

fn handle_transfer(state: &Arc<Mutex<DexState>>, provider: &MemoryProvider, message: &OutgoingMessage) {
    let input = &message.call.input;
    let (Some(amount), Some(recipient)) = (amount_field(input, "amount"), address_field(input, "recipient")) else {
        return;
    };
    let payload = input.get("payload").cloned().unwrap_or(Value::Null);
    let owner = message.sender.clone();

    let mut state = state.lock();
    let Some((root, wallet_owner)) = state.wallet_info.get(&message.recipient).cloned() else {
        return;
    };
    if wallet_owner != owner {
        return;
    }
    let balance = state.balances.get(&message.recipient).copied().unwrap_or_default();
    if balance < amount {
        debug!(wallet = %message.recipient, balance, amount, "transfer bounced");
        return;
    }
    let Some(pair) = state.pairs.get(&recipient).cloned() else {
        // Plain transfer between owners
        *state.balances.entry(message.recipient.clone()).or_default() -= amount;
        state.credit(&root, &recipient, amount);
        let credited = std::mem::take(&mut state.credited);
        drop(state);
        deploy_wallets(provider, &credited);
        return;
    };

    let id = payload.get("id").cloned().unwrap_or(Value::Null);
    let callbacks: Vec<(String, Value)> = match payload.get("op").and_then(Value::as_str) {
        Some("exchange") => {
            let min = amount_field(&payload, "expected_amount").unwrap_or_default();
            match pair.exchange_output(amount, &root) {
                Some((output, fee)) if output >= min && output > 0 => {
                    let receive_root = pair.counterpart(&root).cloned().unwrap_or_else(|| root.clone());
                    *state.balances.entry(message.recipient.clone()).or_default() -= amount;
                    if let Some(pair) = state.pairs.get_mut(&recipient) {
                        pair.apply_exchange(&root, amount, output);
                    }
                    state.credit(&receive_root, &owner, output);
                    info!(pair = %recipient, amount, output, "simulated exchange");
                    vec![(
                        "dexPairExchangeSuccess".to_string(),
                        json!({
                            "id": id,
                            "via_account": false,
                            "result": {
                                "spent_token": root,
                                "spent_amount": amount.to_string(),
                                "receive_token": receive_root,
                                "receive_amount": output.to_string(),
                                "fee": fee.to_string(),
                            },
                        }),
                    )]
                }
                _ => vec![("dexPairOperationCancelled".to_string(), json!({ "id": id }))],
            }
        }
        Some("cross") => cross_exchange(&mut state, &pair, &root, &owner, &message.recipient, amount, &payload),
        Some("withdraw") if root == pair.lp_root => {
            let min_left = amount_field(&payload, "expected_left_amount").unwrap_or_default();
            let min_right = amount_field(&payload, "expected_right_amount").unwrap_or_default();
            match pair.withdraw_amounts(amount) {
                Some((left, right)) if left >= min_left && right >= min_right => {
                    *state.balances.entry(message.recipient.clone()).or_default() -= amount;
                    if let Some(pair) = state.pairs.get_mut(&recipient) {
                        pair.left_reserve -= left;
                        pair.right_reserve -= right;
                        pair.lp_supply -= amount;
                    }
                    state.credit(&pair.left_root, &owner, left);
                    state.credit(&pair.right_root, &owner, right);
                    vec![(
                        "dexPairWithdrawSuccess".to_string(),
                        json!({
                            "id": id,
                            "result": {
                                "lp": amount.to_string(),
                                "left": left.to_string(),
                                "right": right.to_string(),
                            },
                        }),
                    )]
                }
                _ => vec![("dexPairOperationCancelled".to_string(), json!({ "id": id }))],
            }
        }
        _ => vec![("dexPairOperationCancelled".to_string(), json!({ "id": id }))],
    };
    let credited = std::mem::take(&mut state.credited);
    drop(state);
    deploy_wallets(provider, &credited);

    for (method, input) in callbacks {
        provider.callback(&owner, Some(&recipient), &method, input);
    }
}

fn cross_exchange(
    state: &mut DexState,
    first: &SimulatedPair,
    spent_root: &Address,
    owner: &Address,
    spent_wallet: &Address,
    amount: u128,
    payload: &Value,
) -> Vec<(String, Value)> {
    let id = payload.get("id").cloned().unwrap_or(Value::Null);
    let cancel = |step: usize| {
        vec![(
            "onCrossExchangeCancel".to_string(),
            json!({ "id": id, "step_index": step }),
        )]
    };

    let mut hops = vec![(first.address.clone(), spent_root.clone(), 0u128)];
    if let Some(steps) = payload.get("steps").and_then(Value::as_array) {
        for step in steps {
            let Some(outcoming) = address_field(step, "outcoming") else {
                return cancel(hops.len());
            };
            let min = amount_field(step, "amount").unwrap_or_default();
            let previous_out = hops.last().map(|(pair, spent, _)| {
                state
                    .pairs
                    .get(pair)
                    .and_then(|pair| pair.counterpart(spent).cloned())
            });
            let Some(Some(spent)) = previous_out else {
                return cancel(hops.len());
            };
            let Some(next_pair) = state.pair_between(&spent, &outcoming).map(|pair| pair.address.clone()) else {
                return cancel(hops.len());
            };
            hops.push((next_pair, spent, min));
        }
    }

    let first_min = amount_field(payload, "expected_amount").unwrap_or_default();
    let mut simulated = state.pairs.clone();
    let mut current = amount;
    let hop_count = hops.len();
    for (index, (pair_address, spent, min)) in hops.iter().enumerate() {
        let Some(pair) = simulated.get_mut(pair_address) else {
            return cancel(index);
        };
        let Some((output, _)) = pair.exchange_output(current, spent) else {
            return cancel(index);
        };
        let required = if index == 0 { first_min } else { *min };
        if output < required || output == 0 {
            return cancel(index);
        }
        pair.apply_exchange(spent, current, output);
        current = output;
    }

    let receive_root = hops
        .last()
        .and_then(|(pair, spent, _)| simulated.get(pair).and_then(|pair| pair.counterpart(spent).cloned()))
        .unwrap_or_else(|| spent_root.clone());
    state.pairs = simulated;
    *state.balances.entry(spent_wallet.clone()).or_default() -= amount;
    state.credit(&receive_root, owner, current);
    info!(hops = hop_count, amount, output = current, "simulated cross-pair exchange");

    vec![(
        "onCrossExchangeSuccess".to_string(),
        json!({
            "id": id,
            "result": {
                "spent_token": spent_root,
                "spent_amount": amount.to_string(),
                "receive_token": receive_root,
                "receive_amount": current.to_string(),
                "fee": "0",
            },
        }),
    )]
}

fn handle_deposit(state: &Arc<Mutex<DexState>>, provider: &MemoryProvider, message: &OutgoingMessage) {
    let input = &message.call.input;
    let id = id_field(input, "_callId");
    let owner = message.sender.clone();
    let operations: Vec<(Address, u128)> = input
        .get("_operations")
        .and_then(Value::as_array)
        .map(|operations| {
            operations
                .iter()
                .filter_map(|operation| Some((address_field(operation, "root")?, amount_field(operation, "amount")?)))
                .collect()
        })
        .unwrap_or_default();

    let (callback, credited) = {
        let mut state = state.lock();
        let account = message.recipient.clone();
        let pair = match operations.as_slice() {
            [(a, _), (b, _)] => state.pair_between(a, b).cloned(),
            _ => None,
        };
        let funded = operations.iter().all(|(root, amount)| {
            state
                .account_balances
                .get(&(account.clone(), root.clone()))
                .is_some_and(|balance| balance >= amount)
        });

        let callback = match pair {
            Some(pair) if funded && state.account_owners.get(&account) == Some(&owner) => {
                let amount_of = |root: &Address| {
                    operations
                        .iter()
                        .find(|(candidate, _)| candidate == root)
                        .map(|(_, amount)| *amount)
                        .unwrap_or_default()
                };
                let (left, right) = (amount_of(&pair.left_root), amount_of(&pair.right_root));
                let reward = pair.lp_reward(left, right).unwrap_or_default();
                let (used_left, used_right) = if pair.lp_supply == 0 {
                    (left, right)
                } else {
                    (
                        mul_div(reward, pair.left_reserve, pair.lp_supply).unwrap_or(left).min(left),
                        mul_div(reward, pair.right_reserve, pair.lp_supply).unwrap_or(right).min(right),
                    )
                };
                for (root, used) in [(&pair.left_root, used_left), (&pair.right_root, used_right)] {
                    if let Some(balance) = state.account_balances.get_mut(&(account.clone(), root.clone())) {
                        *balance -= used;
                    }
                }
                if let Some(stored) = state.pairs.get_mut(&pair.address) {
                    stored.left_reserve += used_left;
                    stored.right_reserve += used_right;
                    stored.lp_supply += reward;
                }
                state.credit(&pair.lp_root, &owner, reward);
                (
                    "dexPairDepositLiquiditySuccess",
                    json!({
                        "id": id,
                        "via_account": true,
                        "result": {
                            "left": used_left.to_string(),
                            "right": used_right.to_string(),
                            "lp_reward": reward.to_string(),
                        },
                    }),
                    pair.address.clone(),
                )
            }
            Some(pair) => ("dexPairOperationCancelled", json!({ "id": id }), pair.address.clone()),
            None => ("dexPairOperationCancelled", json!({ "id": id }), account),
        };
        (callback, std::mem::take(&mut state.credited))
    };
    deploy_wallets(provider, &credited);

    let (method, input, source) = callback;
    provider.callback(&owner, Some(&source), method, input);
}
