//! HelloWorld test contract: ABI bindings, creation bytecode and the
//! calldata used for randomized interactions.

use alloy::primitives::{Bytes, U256};
use alloy::sol;
use alloy::sol_types::{SolCall, SolValue};
use anyhow::{Context, Result};

sol! {
    interface IHelloWorld {
        function greet() external view returns (string memory);
        function setGreeting(string memory _greeting) external;
        function ping() external;
        function batchPing(uint256 count) external;
        function toggleGreeting() external;
        function storeMessage(string memory message) external;
        function getRandomNumber() external view returns (uint256);
    }
}

const HELLO_WORLD_HEX: &str = include_str!("hello_world.hex");

/// Greetings picked at random by contract-read activity
pub const GREETINGS: &[&str] = &[
    "Hello Rome Protocol!",
    "Greetings from automation!",
    "Testing smart contracts",
    "Random activity ongoing",
    "Blockchain interaction test",
];

/// Creation bytecode (constructor sets "Hello, World!")
pub fn hello_world_bytecode() -> Result<Bytes> {
    let raw = hex::decode(HELLO_WORLD_HEX.trim()).context("HelloWorld bytecode is not valid hex")?;
    Ok(raw.into())
}

pub fn set_greeting_calldata(greeting: &str) -> Bytes {
    IHelloWorld::setGreetingCall {
        _greeting: greeting.to_string(),
    }
    .abi_encode()
    .into()
}

pub fn greet_calldata() -> Bytes {
    IHelloWorld::greetCall {}.abi_encode().into()
}

pub fn decode_greeting(data: &[u8]) -> Result<String> {
    let (greeting,) = <(String,)>::abi_decode_params(data).context("Unexpected greet() return data")?;
    Ok(greeting)
}

/// Fixed set of state-changing calls fired at deployed contracts
pub fn interaction_calldata() -> Vec<Bytes> {
    vec![
        set_greeting_calldata("Hello, World!"),
        set_greeting_calldata("Hello Rome!"),
        IHelloWorld::pingCall {}.abi_encode().into(),
        IHelloWorld::batchPingCall { count: U256::from(5) }.abi_encode().into(),
        IHelloWorld::toggleGreetingCall {}.abi_encode().into(),
        IHelloWorld::storeMessageCall {
            message: "Rome Protocol Rocks!".to_string(),
        }
        .abi_encode()
        .into(),
        IHelloWorld::getRandomNumberCall {}.abi_encode().into(),
    ]
}
