/*
 * Copyright (c) 2024, United States Government, as represented by the
 * Administrator of the National Aeronautics and Space Administration.
 * All rights reserved.
 *
 * The ODIN - Open Data Integration Framework is licensed under the
 * Apache License, Version 2.0 (the "License"); you may not use this file
 * except in compliance with the License. You may obtain a copy of the
 * License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Textual value codec: parses and writes an object-literal grammar closely tracking
//! `fanx/{Token,Tokenizer,ObjDecoder,ObjEncoder}.py`.

pub mod decoder;
pub mod encoder;
pub mod token;
pub mod tokenizer;

pub use decoder::decode;
pub use encoder::{encode, encode_to, EncodeOptions};
