// Copyright 2025 MxRPC Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # MxRPC CLI
//!
//! Command-line interface for the MxRPC matrix job dispatcher.
//!
//! - **Workers**: compute servers that execute `add`, `multiply` and `transpose`
//! - **Dispatcher**: routes each job to the least-busy worker and fails over
//! - **Client**: `submit` a job or ask a dispatcher for its `status`
//! - **Certificates**: `gen-cert` writes a self-signed pair for local setups
//!
//! ## Configuration
//!
//! Flags win over environment variables, which win over defaults:
//!
//! | flag | environment | default |
//! |---|---|---|
//! | `--cert` | `MXRPC_CERT` | `server.crt` |
//! | `--key` | `MXRPC_KEY` | `server.key` |
//! | `--ca` | `MXRPC_CA` | none (peer not verified) |
//! | worker `--bind` | `PORT` (binds `0.0.0.0:$PORT`) | required |

pub mod certgen;
pub mod config;
